// 该文件是 Kantu （看图识物） 项目的一部分。
// src/model/classify.rs - 图像分类模型
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

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::marker::PhantomData;
use std::sync::Mutex;

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  input::AsNhwcFrame,
  model::{ClassItem, ClassifyResult, Labels, LabelsError, Model},
};

const CLASSIFY_SCHEME: &str = "classify";
const CLASSIFY_CHANNELS: i64 = 3;
// 量化分数为无符号字节，除以 255 归一化到 [0, 1]
const SCORE_SCALE: f32 = 255.0;

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Error, Debug)]
pub enum ClassifierError {
  #[error("推理运行时错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("标签错误: {0}")]
  LabelsError(#[from] LabelsError),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("模型输出不一致: {0}")]
  ModelInconsistent(String),
  #[error("推理会话锁被污染")]
  SessionPoisoned,
}

/// 图像分类模型：u8 NHWC 输入，按标签输出分数，保留 top-k。
pub struct Classifier<const W: u32, const H: u32, Frame> {
  session: Mutex<Session>,
  input_name: String,
  output_name: String,
  labels: Labels,
  top_k: usize,
  _phantom: PhantomData<Frame>,
}

pub type ClassifierNhwc<const W: u32, const H: u32> = Classifier<W, H, RgbNhwcFrame<W, H>>;

pub struct ClassifierBuilder {
  model_path: String,
  labels_path: String,
  top_k: usize,
}

impl FromUrlWithScheme for ClassifierBuilder {
  const SCHEME: &'static str = CLASSIFY_SCHEME;
}

impl FromUrl for ClassifierBuilder {
  type Error = ClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ClassifierError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let model_path = urlencoding::decode(url.path())
      .map_err(|e| ClassifierError::ModelPathError(e.to_string()))?
      .into_owned();

    let mut labels_path = None;
    let mut top_k = DEFAULT_TOP_K;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "labels" => labels_path = Some(value.into_owned()),
        "topk" => {
          top_k = value.parse().map_err(|_| {
            ClassifierError::ModelPathError(format!("无效的 topk 参数: {}", value))
          })?;
        }
        _ => {}
      }
    }

    let labels_path = labels_path.ok_or_else(|| {
      ClassifierError::ModelPathError("缺少 labels 参数（标签文件路径）".to_string())
    })?;

    Ok(ClassifierBuilder {
      model_path,
      labels_path,
      top_k,
    })
  }
}

impl ClassifierBuilder {
  pub fn top_k(mut self, top_k: usize) -> Self {
    self.top_k = top_k;
    self
  }

  pub fn build<const W: u32, const H: u32, Frame>(
    self,
  ) -> Result<Classifier<W, H, Frame>, ClassifierError> {
    if self.top_k == 0 {
      return Err(ClassifierError::ModelInvalid("top-k 至少为 1".to_string()));
    }

    info!("加载分类模型: {}", self.model_path);
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(ort::Error::from)?
      .commit_from_file(&self.model_path)?;

    if session.inputs().len() != 1 {
      return Err(ClassifierError::ModelInvalid(format!(
        "期望模型输入数量为 1, 实际为 {}",
        session.inputs().len()
      )));
    }
    if session.outputs().len() != 1 {
      return Err(ClassifierError::ModelInvalid(format!(
        "期望模型输出数量为 1, 实际为 {}",
        session.outputs().len()
      )));
    }

    let input_name = session.inputs()[0].name().to_string();
    let output_name = session.outputs()[0].name().to_string();
    let labels = Labels::from_file(&self.labels_path)?;

    info!(
      "分类模型加载完成, 输入: {}, 输出: {}, 标签数量: {}, top-k: {}",
      input_name,
      output_name,
      labels.len(),
      self.top_k
    );

    Ok(Classifier {
      session: Mutex::new(session),
      input_name,
      output_name,
      labels,
      top_k: self.top_k,
      _phantom: PhantomData,
    })
  }
}

impl<const W: u32, const H: u32, Frame> Classifier<W, H, Frame> {
  pub fn labels(&self) -> &Labels {
    &self.labels
  }
}

impl<const W: u32, const H: u32, Frame: AsNhwcFrame<W, H>> Model for Classifier<W, H, Frame> {
  type Input = Frame;
  type Output = ClassifyResult;
  type Error = ClassifierError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let data = input.as_nhwc();
    let dims = vec![1_i64, H as i64, W as i64, CLASSIFY_CHANNELS];

    debug!("设置模型输入");
    let mut session = self
      .session
      .lock()
      .map_err(|_| ClassifierError::SessionPoisoned)?;
    let tensor = TensorRef::from_array_view((dims, data))?;

    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;

    // 分数缓冲是临时的，取完 top-k 即丢弃。
    // 量化模型输出 u8 字节分数，浮点模型输出已归一化的 f32 分数。
    let value = &outputs[self.output_name.as_str()];
    if let Ok((_, scores)) = value.try_extract_tensor::<u8>() {
      if scores.len() != self.labels.len() {
        return Err(ClassifierError::ModelInconsistent(format!(
          "分数数量 {} 与标签数量 {} 不一致",
          scores.len(),
          self.labels.len()
        )));
      }
      Ok(top_k_quantized(scores, &self.labels, self.top_k))
    } else if let Ok((_, scores)) = value.try_extract_tensor::<f32>() {
      if scores.len() != self.labels.len() {
        return Err(ClassifierError::ModelInconsistent(format!(
          "分数数量 {} 与标签数量 {} 不一致",
          scores.len(),
          self.labels.len()
        )));
      }
      Ok(top_k_scores(scores, &self.labels, self.top_k))
    } else {
      Err(ClassifierError::ModelInconsistent(
        "不支持的输出张量类型, 仅支持 u8 与 f32".to_string(),
      ))
    }
  }
}

/// 有界最小堆保留分数最高的 k 个条目，分数除以 255 归一化。
/// 分数相同时保留序号较小的标签。
pub fn top_k_quantized(scores: &[u8], labels: &Labels, k: usize) -> ClassifyResult {
  let mut heap: BinaryHeap<Reverse<(u8, Reverse<usize>)>> = BinaryHeap::with_capacity(k + 1);
  for (index, &score) in scores.iter().enumerate() {
    heap.push(Reverse((score, Reverse(index))));
    if heap.len() > k {
      heap.pop();
    }
  }

  let mut picked: Vec<(usize, u8)> = heap
    .into_iter()
    .map(|Reverse((score, Reverse(index)))| (index, score))
    .collect();
  picked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

  let items = picked
    .into_iter()
    .map(|(index, score)| ClassItem {
      class_id: index as u32,
      label: labels.name_of(index).to_string(),
      score: score as f32 / SCORE_SCALE,
    })
    .collect();
  ClassifyResult { items }
}

/// 浮点分数版本：分数已在 [0, 1]，直接选取 top-k。
pub fn top_k_scores(scores: &[f32], labels: &Labels, k: usize) -> ClassifyResult {
  let mut picked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
  picked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
  picked.truncate(k);

  let items = picked
    .into_iter()
    .map(|(index, score)| ClassItem {
      class_id: index as u32,
      label: labels.name_of(index).to_string(),
      score,
    })
    .collect();
  ClassifyResult { items }
}
