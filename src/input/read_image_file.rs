// 该文件是 Kantu （看图识物） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{RgbNchwFrame, RgbNhwcFrame},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(image::ImageError),
  #[error("图像路径错误: {0}")]
  PathError(String),
  #[error("空图像: {0}")]
  EmptyImage(String),
}

impl From<std::io::Error> for ImageFileInputError {
  fn from(err: std::io::Error) -> Self {
    ImageFileInputError::IoError(err)
  }
}

impl From<image::ImageError> for ImageFileInputError {
  fn from(err: image::ImageError) -> Self {
    ImageFileInputError::ImageLoadError(err)
  }
}

pub struct ImageFileInput<const W: u32, const H: u32> {
  image: Option<RgbImage>,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for ImageFileInput<W, H> {
  const SCHEME: &'static str = "image";
}

impl<const W: u32, const H: u32> FromUrl for ImageFileInput<W, H> {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let path = urlencoding::decode(url.path())
      .map_err(|e| ImageFileInputError::PathError(e.to_string()))?;
    let image: RgbImage = ImageReader::open(path.as_ref())?.decode()?.into();

    Self::from_image(image, path.as_ref())
  }
}

impl<const W: u32, const H: u32> ImageFileInput<W, H> {
  // 零尺寸图像是装载阶段唯一的拒绝项
  fn from_image(image: RgbImage, path: &str) -> Result<Self, ImageFileInputError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(ImageFileInputError::EmptyImage(path.to_string()));
    }

    Ok(ImageFileInput { image: Some(image) })
  }

  pub fn into_nhwc(self) -> ImageFileInputNhwc<W, H> {
    ImageFileInputNhwc { inner: self }
  }

  pub fn into_nchw(self) -> ImageFileInputNchw<W, H> {
    ImageFileInputNchw { inner: self }
  }
}

pub struct ImageFileInputNhwc<const W: u32, const H: u32> {
  inner: ImageFileInput<W, H>,
}

impl<const W: u32, const H: u32> Iterator for ImageFileInputNhwc<W, H> {
  type Item = RgbNhwcFrame<W, H>;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.image.take().map(|image| RgbNhwcFrame::from(&image))
  }
}

pub struct ImageFileInputNchw<const W: u32, const H: u32> {
  inner: ImageFileInput<W, H>,
}

impl<const W: u32, const H: u32> Iterator for ImageFileInputNchw<W, H> {
  type Item = RgbNchwFrame<W, H>;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.image.take().map(|image| RgbNchwFrame::from(&image))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::AsNhwcFrame;
  use image::{Rgb, RgbImage};
  use std::path::PathBuf;

  fn sample_image(name: &str, color: [u8; 3]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("kantu-image-{}-{}.png", name, std::process::id()));
    RgbImage::from_pixel(8, 8, Rgb(color)).save(&path).unwrap();
    path
  }

  #[test]
  fn scheme_mismatch_is_rejected() {
    let url = Url::parse("gallery:/some/picture.png").unwrap();
    assert!(matches!(
      ImageFileInput::<4, 4>::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch)
    ));
  }

  #[test]
  fn zero_sized_image_is_rejected() {
    let result = ImageFileInput::<4, 4>::from_image(RgbImage::new(0, 0), "zero.png");
    assert!(matches!(result, Err(ImageFileInputError::EmptyImage(_))));
  }

  #[test]
  fn iterator_yields_exactly_one_frame() {
    let path = sample_image("oneshot", [30, 60, 90]);
    let url = Url::parse(&format!("image:{}", path.display())).unwrap();

    let input = ImageFileInput::<4, 4>::from_url(&url).unwrap();
    let mut frames = input.into_nhwc();

    let frame = frames.next().unwrap();
    assert_eq!(&frame.as_nhwc()[..3], &[30, 60, 90]);
    assert!(frames.next().is_none());

    std::fs::remove_file(&path).ok();
  }

  #[test]
  fn missing_file_is_an_io_error() {
    let url = Url::parse("image:/no/such/kantu-picture.png").unwrap();
    assert!(matches!(
      ImageFileInput::<4, 4>::from_url(&url),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
