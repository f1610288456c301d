// 该文件是 Kantu （看图识物） 项目的一部分。
// src/model/detect.rs - 目标检测模型
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

use std::marker::PhantomData;
use std::sync::Mutex;

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNchwFrame,
  input::AsNchwFrame,
  model::{DetectItem, DetectResult, Labels, LabelsError, Model},
};

const DETECT_SCHEME: &str = "detect";
const DETECT_CHANNELS: i64 = 3;
// 检测头每个网格单元的盒参数数量: x, y, w, h, objectness
const BOX_FIELDS: usize = 5;

pub const DEFAULT_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("推理运行时错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("标签错误: {0}")]
  LabelsError(#[from] LabelsError),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("推理会话锁被污染")]
  SessionPoisoned,
}

/// 网格检测模型：f32 NCHW 输入，每个检测头输出 [1, grid, grid, 5 + 类别数]。
pub struct Detector<const W: u32, const H: u32, Frame> {
  session: Mutex<Session>,
  input_name: String,
  output_names: Vec<String>,
  labels: Labels,
  confidence: f32,
  nms_threshold: f32,
  _phantom: PhantomData<Frame>,
}

pub type DetectorNchw<const W: u32, const H: u32> = Detector<W, H, RgbNchwFrame<W, H>>;

pub struct DetectorBuilder {
  model_path: String,
  labels_path: String,
  confidence: f32,
  nms_threshold: f32,
}

impl FromUrlWithScheme for DetectorBuilder {
  const SCHEME: &'static str = DETECT_SCHEME;
}

impl FromUrl for DetectorBuilder {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectorError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let model_path = urlencoding::decode(url.path())
      .map_err(|e| DetectorError::ModelPathError(e.to_string()))?
      .into_owned();

    let mut labels_path = None;
    let mut confidence = DEFAULT_CONFIDENCE;
    let mut nms_threshold = DEFAULT_NMS_THRESHOLD;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "labels" => labels_path = Some(value.into_owned()),
        "confidence" => {
          confidence = value.parse().map_err(|_| {
            DetectorError::ModelPathError(format!("无效的 confidence 参数: {}", value))
          })?;
        }
        "nms" => {
          nms_threshold = value
            .parse()
            .map_err(|_| DetectorError::ModelPathError(format!("无效的 nms 参数: {}", value)))?;
        }
        _ => {}
      }
    }

    let labels_path = labels_path.ok_or_else(|| {
      DetectorError::ModelPathError("缺少 labels 参数（标签文件路径）".to_string())
    })?;

    Ok(DetectorBuilder {
      model_path,
      labels_path,
      confidence,
      nms_threshold,
    })
  }
}

impl DetectorBuilder {
  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn nms_threshold(mut self, nms_threshold: f32) -> Self {
    self.nms_threshold = nms_threshold;
    self
  }

  pub fn build<const W: u32, const H: u32, Frame>(
    self,
  ) -> Result<Detector<W, H, Frame>, DetectorError> {
    info!("加载检测模型: {}", self.model_path);
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(ort::Error::from)?
      .commit_from_file(&self.model_path)?;

    if session.inputs().len() != 1 {
      return Err(DetectorError::ModelInvalid(format!(
        "期望模型输入数量为 1, 实际为 {}",
        session.inputs().len()
      )));
    }
    if session.outputs().is_empty() {
      return Err(DetectorError::ModelInvalid(
        "模型没有任何输出（检测头）".to_string(),
      ));
    }

    let input_name = session.inputs()[0].name().to_string();
    let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
    let labels = Labels::from_file(&self.labels_path)?;

    info!(
      "检测模型加载完成, 输入: {}, 检测头数量: {}, 标签数量: {}",
      input_name,
      output_names.len(),
      labels.len()
    );

    Ok(Detector {
      session: Mutex::new(session),
      input_name,
      output_names,
      labels,
      confidence: self.confidence,
      nms_threshold: self.nms_threshold,
      _phantom: PhantomData,
    })
  }
}

impl<const W: u32, const H: u32, Frame: AsNchwFrame<W, H>> Model for Detector<W, H, Frame> {
  type Input = Frame;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    // u8 平面帧转为 [0, 1] 浮点张量
    let data: Vec<f32> = input.as_nchw().iter().map(|&v| v as f32 / 255.0).collect();
    let dims = vec![1_i64, DETECT_CHANNELS, H as i64, W as i64];

    debug!("设置模型输入");
    let mut session = self
      .session
      .lock()
      .map_err(|_| DetectorError::SessionPoisoned)?;
    let tensor = TensorRef::from_array_view((dims, data.as_slice()))?;

    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;

    debug!("获取模型输出");
    let mut heads = Vec::with_capacity(self.output_names.len());
    for name in &self.output_names {
      match outputs[name.as_str()].try_extract_tensor::<f32>() {
        Ok((shape, data)) => {
          let shape: Vec<i64> = shape.iter().copied().collect();
          heads.push((shape, data.to_vec()));
        }
        Err(e) => {
          error!("获取检测头 {} 输出失败: {}", name, e);
        }
      }
    }

    Ok(postprocess(
      &heads,
      &self.labels,
      self.confidence,
      self.nms_threshold,
    ))
  }
}

/// 解码检测头并做类内 NMS，边界框为归一化的 [x_min, y_min, x_max, y_max]。
pub fn postprocess(
  heads: &[(Vec<i64>, Vec<f32>)],
  labels: &Labels,
  confidence: f32,
  nms_threshold: f32,
) -> DetectResult {
  let num_classes = labels.len();
  let mut items = Vec::new();

  for (head_idx, (shape, data)) in heads.iter().enumerate() {
    if shape.len() != 4 || shape[0] != 1 {
      error!("检测头 {}: 输出形状无效: {:?}", head_idx, shape);
      continue;
    }
    let (grid_h, grid_w, channels) = (shape[1] as usize, shape[2] as usize, shape[3] as usize);
    if channels != BOX_FIELDS + num_classes {
      error!(
        "检测头 {}: 通道数不匹配: 实际 {}, 期望 {}",
        head_idx,
        channels,
        BOX_FIELDS + num_classes
      );
      continue;
    }

    for row in 0..grid_h {
      for col in 0..grid_w {
        let base = (row * grid_w + col) * channels;

        let objectness = data[base + 4];
        if objectness < confidence {
          continue;
        }

        // 找到最高类别分数
        let mut max_class_score = 0.0f32;
        let mut max_class_id = 0usize;
        for class_id in 0..num_classes {
          let score = data[base + BOX_FIELDS + class_id];
          if score > max_class_score {
            max_class_score = score;
            max_class_id = class_id;
          }
        }

        let score = objectness * max_class_score;
        if score < confidence {
          continue;
        }

        // 解码边界框并归一化到 [0, 1]
        let cx = (col as f32 + data[base]) / grid_w as f32;
        let cy = (row as f32 + data[base + 1]) / grid_h as f32;
        let w = data[base + 2];
        let h = data[base + 3];

        let x_min = (cx - w / 2.0).clamp(0.0, 1.0);
        let y_min = (cy - h / 2.0).clamp(0.0, 1.0);
        let x_max = (cx + w / 2.0).clamp(0.0, 1.0);
        let y_max = (cy + h / 2.0).clamp(0.0, 1.0);

        if x_min < x_max && y_min < y_max {
          items.push(DetectItem {
            class_id: max_class_id as u32,
            label: labels.name_of(max_class_id).to_string(),
            score,
            bbox: [x_min, y_min, x_max, y_max],
          });
        }
      }
    }
  }

  let items = nms(items, nms_threshold);
  debug!("检测到 {} 个物体", items.len());

  DetectResult {
    items: items.into_boxed_slice(),
  }
}

/// 非极大值抑制：按置信度降序，类内 IoU 超阈值的框被剔除。
pub fn nms(mut detections: Vec<DetectItem>, threshold: f32) -> Vec<DetectItem> {
  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result = Vec::new();
  while !detections.is_empty() {
    let best = detections.remove(0);
    detections.retain(|det| det.class_id != best.class_id || iou(&best.bbox, &det.bbox) < threshold);
    result.push(best);
  }
  result
}

/// 计算两个归一化边界框的 IoU。
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      label: format!("class-{}", class_id),
      score,
      bbox,
    }
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let b = [0.1, 0.1, 0.5, 0.5];
    assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    assert_eq!(iou(&[0.0, 0.0, 0.2, 0.2], &[0.5, 0.5, 0.9, 0.9]), 0.0);
  }

  #[test]
  fn nms_suppresses_overlapping_boxes_of_same_class() {
    let detections = vec![
      item(0, 0.9, [0.1, 0.1, 0.5, 0.5]),
      item(0, 0.8, [0.12, 0.12, 0.5, 0.5]),
      item(0, 0.7, [0.6, 0.6, 0.9, 0.9]),
    ];
    let kept = nms(detections, 0.45);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].score, 0.7);
  }

  #[test]
  fn nms_keeps_overlapping_boxes_of_different_classes() {
    let detections = vec![
      item(0, 0.9, [0.1, 0.1, 0.5, 0.5]),
      item(1, 0.8, [0.1, 0.1, 0.5, 0.5]),
    ];
    assert_eq!(nms(detections, 0.45).len(), 2);
  }

  #[test]
  fn postprocess_decodes_grid_cell_to_normalized_bbox() {
    let labels = Labels::from(vec!["cat", "dog"]);

    // 单个 2x2 检测头, 只有 (row=0, col=1) 超过阈值
    let channels = BOX_FIELDS + 2;
    let mut data = vec![0.0f32; 2 * 2 * channels];
    let base = (0 * 2 + 1) * channels;
    data[base] = 0.5; // x 偏移
    data[base + 1] = 0.5; // y 偏移
    data[base + 2] = 0.5; // 宽（相对整幅输入）
    data[base + 3] = 0.5; // 高
    data[base + 4] = 0.9; // objectness
    data[base + 5] = 0.2; // cat
    data[base + 6] = 0.8; // dog

    let heads = vec![(vec![1_i64, 2, 2, channels as i64], data)];
    let result = postprocess(&heads, &labels, 0.5, 0.45);

    assert_eq!(result.items.len(), 1);
    let det = &result.items[0];
    assert_eq!(det.label, "dog");
    assert!((det.score - 0.72).abs() < 1e-6);
    assert!((det.bbox[0] - 0.5).abs() < 1e-6);
    assert!((det.bbox[1] - 0.0).abs() < 1e-6);
    assert!((det.bbox[2] - 1.0).abs() < 1e-6);
    assert!((det.bbox[3] - 0.5).abs() < 1e-6);
  }

  #[test]
  fn postprocess_skips_malformed_heads() {
    let labels = Labels::from(vec!["cat"]);
    let heads = vec![(vec![1_i64, 4, 4], vec![0.0f32; 16])];
    assert!(postprocess(&heads, &labels, 0.5, 0.45).is_empty());
  }
}
