// 该文件是 Kantu （看图识物） 项目的一部分。
// src/output/draw.rs - 识别结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::{
  frame::{RgbNchwFrame, RgbNhwcFrame},
  input::{AsNchwFrame, AsNhwcFrame},
  model::{ClassifyResult, DetectItem, DetectResult},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const PANEL_MARGIN: i32 = 4;
const PALETTE_SIZE: usize = 32;

pub struct Draw {
  font: FontArc,
  font_scale: PxScale,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf"); // default font
    let font = FontArc::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    // 按色相均匀取色，类别序号对调色板长度取模
    let colors: Vec<Rgb<u8>> = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      colors,
    }
  }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

impl Draw {
  // 绘制一个矩形边框与标签，bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(
    &self,
    image: &mut RgbImage,
    bbox: &[f32; 4],
    label: &str,
    score: f32,
    color: Rgb<u8>,
  ) {
    let (w, h) = (image.width() as f32, image.height() as f32);

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let rect = Rect::at(x_min, y_min).of_size((x_max - x_min) as u32, (y_max - y_min) as u32);
    draw_hollow_rect_mut(image, rect, color);

    // 绘制第二圈以加粗边框
    if x_max - x_min > 2 && y_max - y_min > 2 {
      let inner =
        Rect::at(x_min + 1, y_min + 1).of_size((x_max - x_min - 2) as u32, (y_max - y_min - 2) as u32);
      draw_hollow_rect_mut(image, inner, color);
    }

    // 标签背景（边框上方）与白色文本
    let text = format!("{} {:.2}", label, score);
    let text_width = (text.len() as f32 * self.label_char_width) as i32;

    let label_x = x_min.max(0);
    let label_y = (y_min - self.label_text_height).max(0);
    let max_width = (w as i32 - label_x).max(0);
    let label_width = text_width.min(max_width);

    if label_width > 0 {
      let rect =
        Rect::at(label_x, label_y).of_size(label_width as u32, self.label_text_height as u32);
      draw_filled_rect_mut(image, rect, color);

      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        self.font_scale,
        &self.font,
        &text,
      );
    }
  }

  /// 绘制检测框与标签。
  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    for DetectItem {
      class_id,
      label,
      score,
      bbox,
    } in result.items.iter()
    {
      let color = self.colors[*class_id as usize % self.colors.len()];
      self.draw_bbox_with_label(image, bbox, label, *score, color);
    }
  }

  /// 在左上角绘制 top-k 分类面板，每行一个 `label:score` 条目。
  pub fn draw_classify_on_image(&self, image: &mut RgbImage, result: &ClassifyResult) {
    for (i, item) in result.items.iter().enumerate() {
      let text = item.to_string();
      let y = PANEL_MARGIN + i as i32 * self.label_text_height;
      if y + self.label_text_height > image.height() as i32 {
        break;
      }

      let text_width = (text.len() as f32 * self.label_char_width) as i32;
      let width = text_width.min(image.width() as i32 - PANEL_MARGIN);
      if width <= 0 {
        break;
      }

      let rect = Rect::at(PANEL_MARGIN, y).of_size(width as u32, self.label_text_height as u32);
      draw_filled_rect_mut(image, rect, Rgb([0u8, 0u8, 0u8]));

      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        PANEL_MARGIN,
        y + self.label_text_vertical_padding,
        self.font_scale,
        &self.font,
        &text,
      );
    }
  }

  pub fn annotate_detections<F: ToRgbImage>(&self, frame: &F, result: &DetectResult) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_detections_on_image(&mut image, result);
    image
  }

  pub fn annotate_classify<F: ToRgbImage>(&self, frame: &F, result: &ClassifyResult) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_classify_on_image(&mut image, result);
    image
  }
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

impl<const W: u32, const H: u32> ToRgbImage for RgbNhwcFrame<W, H> {
  fn to_rgb_image(&self) -> RgbImage {
    let data = self.as_nhwc();

    // NHWC 即交错 RGB
    ImageBuffer::from_fn(W, H, |x, y| {
      let idx = ((y * W + x) * 3) as usize;
      Rgb([data[idx], data[idx + 1], data[idx + 2]])
    })
  }
}

impl<const W: u32, const H: u32> ToRgbImage for RgbNchwFrame<W, H> {
  fn to_rgb_image(&self) -> RgbImage {
    let data = self.as_nchw();
    let plane = (W as usize) * (H as usize);

    ImageBuffer::from_fn(W, H, |x, y| {
      let idx = (y * W + x) as usize;
      Rgb([data[idx], data[plane + idx], data[2 * plane + idx]])
    })
  }
}

/// 识别结果记录：每行一个 JSON 对象。
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  fn label_value(&self, class_id: u32, label: &str) -> serde_json::Value {
    if self.label_with_name {
      serde_json::Value::String(label.to_string())
    } else {
      serde_json::Value::from(class_id)
    }
  }

  pub fn record_detections(
    &self,
    result: &DetectResult,
    path: &std::path::Path,
  ) -> Result<(), std::io::Error> {
    let mut records = Vec::new();
    for item in result.items.iter() {
      let record = serde_json::json!({
        "label": self.label_value(item.class_id, &item.label),
        "score": item.score,
        "bbox": item.bbox,
      });
      records.push(record.to_string());
    }
    std::fs::write(path.with_extension("json"), records.join("\n"))
  }

  pub fn record_classify(
    &self,
    result: &ClassifyResult,
    path: &std::path::Path,
  ) -> Result<(), std::io::Error> {
    let mut records = Vec::new();
    for item in result.items.iter() {
      let record = serde_json::json!({
        "label": self.label_value(item.class_id, &item.label),
        "score": item.score,
      });
      records.push(record.to_string());
    }
    std::fs::write(path.with_extension("json"), records.join("\n"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::ClassItem;

  #[test]
  fn detection_overlay_paints_the_border() {
    let frame = RgbNhwcFrame::<64, 64>::default();
    let result = DetectResult {
      items: Box::new([DetectItem {
        class_id: 0,
        label: "cat".to_string(),
        score: 0.9,
        bbox: [0.25, 0.25, 0.75, 0.75],
      }]),
    };

    let image = Draw::default().annotate_detections(&frame, &result);
    assert_eq!(image.dimensions(), (64, 64));
    // 边框左上角 (16, 16) 必须被着色
    assert_ne!(*image.get_pixel(16, 16), Rgb([0, 0, 0]));
    // 框外像素保持原样
    assert_eq!(*image.get_pixel(60, 60), Rgb([0, 0, 0]));
  }

  #[test]
  fn classify_panel_paints_one_line_per_item() {
    let frame = RgbNhwcFrame::<128, 128>::default();
    let result = ClassifyResult {
      items: Box::new([ClassItem {
        class_id: 1,
        label: "goldfish".to_string(),
        score: 0.98,
      }]),
    };

    let image = Draw::default().annotate_classify(&frame, &result);
    let changed = image.pixels().filter(|p| **p != Rgb([0, 0, 0])).count();
    assert!(changed > 0);
  }

  #[test]
  fn empty_results_leave_the_image_untouched() {
    let frame = RgbNhwcFrame::<32, 32>::default();
    let result = DetectResult { items: Box::new([]) };

    let image = Draw::default().annotate_detections(&frame, &result);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }
}
