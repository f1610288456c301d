// 该文件是 Kantu （看图识物） 项目的一部分。
// src/model.rs - 模型
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

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 分类结果条目，按 `label:score` 形式展示。
#[derive(Debug, Clone)]
pub struct ClassItem {
  pub class_id: u32,
  pub label: String,
  pub score: f32, // 归一化到 [0, 1]
}

impl std::fmt::Display for ClassItem {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{:.4}", self.label, self.score)
  }
}

/// 分类结果：按分数降序排列的 top-k 条目。
#[derive(Debug, Clone)]
pub struct ClassifyResult {
  pub items: Box<[ClassItem]>,
}

impl ClassifyResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

#[derive(Debug, Clone)]
pub struct DetectItem {
  pub class_id: u32,
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // 归一化的 [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

mod labels;
pub use self::labels::{Labels, LabelsError};

#[cfg(feature = "model_classify")]
mod classify;
#[cfg(feature = "model_classify")]
pub use self::classify::{Classifier, ClassifierBuilder, ClassifierError, ClassifierNhwc};

#[cfg(feature = "model_detect")]
mod detect;
#[cfg(feature = "model_detect")]
pub use self::detect::{Detector, DetectorBuilder, DetectorError, DetectorNchw};
