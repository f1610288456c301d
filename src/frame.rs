// 该文件是 Kantu （看图识物） 项目的一部分。
// src/frame.rs - 定尺寸 RGB 帧定义
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

use image::{RgbImage, imageops};

use crate::input::{AsNchwFrame, AsNhwcFrame};

const RGB_CHANNELS: usize = 3;

/// NHWC 帧：字节 (y*W + x)*3 + c 保存像素 (x, y) 的第 c 个通道（RGB 顺序）。
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

/// NCHW 帧：按 R、G、B 三个平面依次排列。
#[derive(Debug, Clone)]
pub struct RgbNchwFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> From<Vec<u8>> for RgbNhwcFrame<W, H> {
  fn from(data: Vec<u8>) -> Self {
    if data.len() != (RGB_CHANNELS * W as usize * H as usize) {
      panic!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        RGB_CHANNELS * W as usize * H as usize,
        data.len()
      );
    }

    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> From<Vec<u8>> for RgbNchwFrame<W, H> {
  fn from(data: Vec<u8>) -> Self {
    if data.len() != (RGB_CHANNELS * W as usize * H as usize) {
      panic!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        RGB_CHANNELS * W as usize * H as usize,
        data.len()
      );
    }

    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0u8; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> Default for RgbNchwFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0u8; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl<const W: u32, const H: u32> RgbNchwFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl<const W: u32, const H: u32> AsMut<[u8]> for RgbNhwcFrame<W, H> {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl<const W: u32, const H: u32> AsMut<[u8]> for RgbNchwFrame<W, H> {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

impl<const W: u32, const H: u32> AsNchwFrame<W, H> for RgbNchwFrame<W, H> {
  fn as_nchw(&self) -> &[u8] {
    &self.data
  }
}

// 无论源图像的尺寸与宽高比如何，都缩放到 W x H（双线性采样）。
fn rescale<const W: u32, const H: u32>(image: &RgbImage) -> RgbImage {
  if image.dimensions() == (W, H) {
    image.clone()
  } else {
    imageops::resize(image, W, H, imageops::FilterType::Triangle)
  }
}

impl<const W: u32, const H: u32> From<&RgbImage> for RgbNhwcFrame<W, H> {
  fn from(image: &RgbImage) -> Self {
    // RgbImage 的原始缓冲即为行主序、通道交错的 RGB 字节
    let resized = rescale::<W, H>(image);
    Self::from(resized.into_raw())
  }
}

impl<const W: u32, const H: u32> From<&RgbImage> for RgbNchwFrame<W, H> {
  fn from(image: &RgbImage) -> Self {
    let resized = rescale::<W, H>(image);

    let mut frame = Self::default();
    let plane = (W as usize) * (H as usize);
    let slice = frame.as_mut();

    for (y, row) in resized.rows().enumerate() {
      for (x, pixel) in row.enumerate() {
        let idx = y * (W as usize) + x;
        slice[idx] = pixel[0];
        slice[plane + idx] = pixel[1];
        slice[2 * plane + idx] = pixel[2];
      }
    }
    frame
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::{AsNchwFrame, AsNhwcFrame};
  use image::Rgb;

  fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
  }

  #[test]
  fn nhwc_solid_color_fills_every_pixel() {
    let frame = RgbNhwcFrame::<224, 224>::from(&solid(64, 64, [17, 130, 201]));
    let data = frame.as_nhwc();
    assert_eq!(data.len(), 224 * 224 * 3);
    for pixel in data.chunks(3) {
      assert_eq!(pixel, [17, 130, 201]);
    }
  }

  #[test]
  fn nchw_solid_color_fills_every_plane() {
    let frame = RgbNchwFrame::<32, 32>::from(&solid(100, 50, [7, 99, 240]));
    let data = frame.as_nchw();
    let plane = 32 * 32;
    assert_eq!(data.len(), plane * 3);
    assert!(data[..plane].iter().all(|&v| v == 7));
    assert!(data[plane..2 * plane].iter().all(|&v| v == 99));
    assert!(data[2 * plane..].iter().all(|&v| v == 240));
  }

  #[test]
  fn rescale_always_yields_target_size() {
    for (w, h) in [(1, 1), (16, 640), (999, 3), (224, 224)] {
      let frame = RgbNhwcFrame::<224, 224>::from(&solid(w, h, [5, 5, 5]));
      assert_eq!(frame.as_nhwc().len(), 224 * 224 * 3);
      let frame = RgbNchwFrame::<224, 224>::from(&solid(w, h, [5, 5, 5]));
      assert_eq!(frame.as_nchw().len(), 224 * 224 * 3);
    }
  }

  #[test]
  fn nhwc_layout_is_row_major_channel_interleaved() {
    let mut image = RgbImage::new(2, 2);
    image.put_pixel(0, 0, Rgb([1, 2, 3]));
    image.put_pixel(1, 0, Rgb([4, 5, 6]));
    image.put_pixel(0, 1, Rgb([7, 8, 9]));
    image.put_pixel(1, 1, Rgb([10, 11, 12]));

    let frame = RgbNhwcFrame::<2, 2>::from(&image);
    assert_eq!(
      frame.as_nhwc(),
      &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
    );
  }

  #[test]
  fn nchw_layout_is_planar() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([1, 2, 3]));
    image.put_pixel(1, 0, Rgb([4, 5, 6]));

    let frame = RgbNchwFrame::<2, 1>::from(&image);
    assert_eq!(frame.as_nchw(), &[1, 4, 2, 5, 3, 6]);
  }

  #[test]
  #[should_panic]
  fn wrong_buffer_length_is_rejected() {
    let _ = RgbNhwcFrame::<4, 4>::from(vec![0u8; 5]);
  }
}
