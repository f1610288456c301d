// 该文件是 Kantu （看图识物） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassifyResult, DetectResult},
  output::{
    Render,
    draw::{Draw, ToRgbImage},
  },
};

pub struct SaveImageFileOutput {
  path: String,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("路径错误: {0}")]
  PathError(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = urlencoding::decode(uri.path())
      .map_err(|e| SaveImageFileError::PathError(e.to_string()))?
      .into_owned();

    Ok(SaveImageFileOutput {
      path,
      draw: Draw::default(),
    })
  }
}

impl SaveImageFileOutput {
  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    warn!("保存图像到文件: {}", self.path);

    Ok(())
  }
}

impl<F: ToRgbImage> Render<F, DetectResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    let image = self.draw.annotate_detections(frame, result);
    self.save_image(image)
  }
}

impl<F: ToRgbImage> Render<F, ClassifyResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &F, result: &ClassifyResult) -> Result<(), Self::Error> {
    let image = self.draw.annotate_classify(frame, result);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::RgbNhwcFrame;
  use crate::model::ClassItem;

  #[test]
  fn scheme_mismatch_is_rejected() {
    let url = Url::parse("folder:/some/result.png").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn renders_and_saves_the_annotated_image() {
    let dir = std::env::temp_dir().join(format!("kantu-save-{}", std::process::id()));
    let path = dir.join("result.png");
    std::fs::remove_dir_all(&dir).ok();

    let url = Url::parse(&format!("image:{}", path.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let frame = RgbNhwcFrame::<32, 32>::default();
    let result = ClassifyResult {
      items: Box::new([ClassItem {
        class_id: 0,
        label: "cat".to_string(),
        score: 0.5,
      }]),
    };
    output.render_result(&frame, &result).unwrap();

    // 父目录自动创建，图像可重新读回
    let saved: image::RgbImage = image::open(&path).unwrap().into();
    assert_eq!(saved.dimensions(), (32, 32));

    std::fs::remove_dir_all(&dir).ok();
  }
}
