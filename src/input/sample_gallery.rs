// 该文件是 Kantu （看图识物） 项目的一部分。
// src/input/sample_gallery.rs - 样本图库输入
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

use std::path::PathBuf;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{RgbNchwFrame, RgbNhwcFrame},
};

// 图库接受的图像扩展名
const GALLERY_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum SampleGalleryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图库路径错误: {0}")]
  PathError(String),
  #[error("图库为空: {0}")]
  EmptyGallery(String),
  #[error("样本序号越界: 序号 {0}, 样本数量 {1}")]
  IndexOutOfRange(usize, usize),
  #[error("样本序号无效: {0}")]
  InvalidIndex(String),
}

/// 样本图库：按文件名排序的目录样本集。
/// 带 `index` 参数时只产出指定序号的样本，否则依次产出全部样本。
pub struct SampleGalleryInput<const W: u32, const H: u32> {
  samples: Vec<PathBuf>,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for SampleGalleryInput<W, H> {
  const SCHEME: &'static str = "gallery";
}

impl<const W: u32, const H: u32> FromUrl for SampleGalleryInput<W, H> {
  type Error = SampleGalleryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SampleGalleryInputError::SchemeMismatch);
    }

    let directory = urlencoding::decode(url.path())
      .map_err(|e| SampleGalleryInputError::PathError(e.to_string()))?;

    let mut samples = Vec::new();
    for entry in std::fs::read_dir(directory.as_ref())? {
      let path = entry?.path();
      let matched = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
          let ext = ext.to_ascii_lowercase();
          GALLERY_EXTENSIONS.iter().any(|e| *e == ext)
        })
        .unwrap_or(false);
      if matched {
        samples.push(path);
      }
    }
    samples.sort();

    if samples.is_empty() {
      return Err(SampleGalleryInputError::EmptyGallery(
        directory.into_owned(),
      ));
    }

    // index 参数选中单个样本，选择会替换此前的样本集
    for (key, value) in url.query_pairs() {
      if key == "index" {
        let index: usize = value
          .parse()
          .map_err(|_| SampleGalleryInputError::InvalidIndex(value.to_string()))?;
        if index >= samples.len() {
          return Err(SampleGalleryInputError::IndexOutOfRange(
            index,
            samples.len(),
          ));
        }
        let selected = samples.swap_remove(index);
        info!("选中样本 {}: {}", index, selected.display());
        samples = vec![selected];
        break;
      }
    }

    Ok(SampleGalleryInput { samples })
  }
}

impl<const W: u32, const H: u32> SampleGalleryInput<W, H> {
  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  // 依次加载样本，解码失败的样本记录日志后跳过
  fn next_image(&mut self) -> Option<RgbImage> {
    while !self.samples.is_empty() {
      let path = self.samples.remove(0);
      match ImageReader::open(&path).map_err(image::ImageError::IoError) {
        Ok(reader) => match reader.decode() {
          Ok(image) => return Some(image.into()),
          Err(e) => error!("样本解码失败: {}, 错误: {}", path.display(), e),
        },
        Err(e) => error!("样本打开失败: {}, 错误: {}", path.display(), e),
      }
    }
    None
  }

  pub fn into_nhwc(self) -> SampleGalleryInputNhwc<W, H> {
    SampleGalleryInputNhwc { inner: self }
  }

  pub fn into_nchw(self) -> SampleGalleryInputNchw<W, H> {
    SampleGalleryInputNchw { inner: self }
  }
}

pub struct SampleGalleryInputNhwc<const W: u32, const H: u32> {
  inner: SampleGalleryInput<W, H>,
}

impl<const W: u32, const H: u32> Iterator for SampleGalleryInputNhwc<W, H> {
  type Item = RgbNhwcFrame<W, H>;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.next_image().map(|image| RgbNhwcFrame::from(&image))
  }
}

pub struct SampleGalleryInputNchw<const W: u32, const H: u32> {
  inner: SampleGalleryInput<W, H>,
}

impl<const W: u32, const H: u32> Iterator for SampleGalleryInputNchw<W, H> {
  type Item = RgbNchwFrame<W, H>;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.next_image().map(|image| RgbNchwFrame::from(&image))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{FromUrl, input::AsNhwcFrame};
  use image::{Rgb, RgbImage};
  use std::path::Path;

  fn build_gallery(name: &str, colors: &[[u8; 3]]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kantu-gallery-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    for (i, color) in colors.iter().enumerate() {
      let image = RgbImage::from_pixel(8, 8, Rgb(*color));
      image.save(dir.join(format!("sample-{}.png", i))).unwrap();
    }
    dir
  }

  fn gallery_url(dir: &Path, query: &str) -> Url {
    Url::parse(&format!("gallery:{}{}", dir.display(), query)).unwrap()
  }

  #[test]
  fn index_selects_single_sample_in_sorted_order() {
    let dir = build_gallery("index", &[[10, 0, 0], [0, 20, 0], [0, 0, 30]]);
    let input =
      SampleGalleryInput::<4, 4>::from_url(&gallery_url(&dir, "?index=1")).unwrap();
    assert_eq!(input.len(), 1);

    let frames: Vec<_> = input.into_nhwc().collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0].as_nhwc()[..3], &[0, 20, 0]);
  }

  #[test]
  fn without_index_yields_every_sample() {
    let dir = build_gallery("all", &[[1, 1, 1], [2, 2, 2]]);
    let input = SampleGalleryInput::<4, 4>::from_url(&gallery_url(&dir, "")).unwrap();
    assert_eq!(input.into_nhwc().count(), 2);
  }

  #[test]
  fn out_of_range_index_is_rejected() {
    let dir = build_gallery("range", &[[1, 1, 1]]);
    let result = SampleGalleryInput::<4, 4>::from_url(&gallery_url(&dir, "?index=5"));
    assert!(matches!(
      result,
      Err(SampleGalleryInputError::IndexOutOfRange(5, 1))
    ));
  }
}
