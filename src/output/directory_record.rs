// 该文件是 Kantu （看图识物） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Utc};
use image::RgbImage;
use thiserror::Error;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassifyResult, DetectResult},
  output::{
    Render,
    draw::{Draw, Record, ToRgbImage},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("帧计数器锁被污染")]
  CounterPoisoned,
}

/// 落盘方式：画框或保存原图并附加 JSON 记录。
pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record(Record),
}

impl DrawWrapper {
  pub fn with(kind: &str) -> Self {
    match kind {
      "record-name" => DrawWrapper::Record(Record {
        label_with_name: true,
      }),
      "record-id" => DrawWrapper::Record(Record {
        label_with_name: false,
      }),
      _ => DrawWrapper::Draw(Box::new(Draw::default())),
    }
  }

  pub fn save_detections<F>(
    &self,
    path: &PathBuf,
    frame: &F,
    result: &DetectResult,
  ) -> Result<(), DirectoryRecordOutputError>
  where
    F: ToRgbImage,
  {
    match self {
      DrawWrapper::Draw(draw) => {
        let image: RgbImage = draw.annotate_detections(frame, result);
        image.save(path)?;
      }
      DrawWrapper::Record(record) => {
        let image = frame.to_rgb_image();
        image.save(path)?;
        record.record_detections(result, path)?;
      }
    };

    Ok(())
  }

  pub fn save_classify<F>(
    &self,
    path: &PathBuf,
    frame: &F,
    result: &ClassifyResult,
  ) -> Result<(), DirectoryRecordOutputError>
  where
    F: ToRgbImage,
  {
    match self {
      DrawWrapper::Draw(draw) => {
        let image: RgbImage = draw.annotate_classify(frame, result);
        image.save(path)?;
      }
      DrawWrapper::Record(record) => {
        let image = frame.to_rgb_image();
        image.save(path)?;
        record.record_classify(result, path)?;
      }
    };

    Ok(())
  }
}

/// 按日期分目录保存结果帧，文件名带时间与帧序号。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counters: Arc<Mutex<u16>>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = {
      let mut kind = "draw";
      for (k, v) in uri.query_pairs() {
        if k == "record" {
          if v == "id" {
            kind = "record-id";
          } else {
            kind = "record-name";
          }
          break;
        }
      }
      kind
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: DrawWrapper::with(kind),
      frame_counters: Arc::new(Mutex::new(0)),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counters
      .lock()
      .map_err(|_| DirectoryRecordOutputError::CounterPoisoned)?;
    let id = counter.wrapping_add(1);
    *counter = id;
    Ok(id)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()?
    )))
  }
}

impl<F: ToRgbImage> Render<F, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    // 空结果默认跳过，always 参数强制落盘
    if self.always || !result.is_empty() {
      let path = self.frame_path()?;
      self.draw.save_detections(&path, frame, result)?;
    }
    Ok(())
  }
}

impl<F: ToRgbImage> Render<F, ClassifyResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &F, result: &ClassifyResult) -> Result<(), Self::Error> {
    if self.always || !result.is_empty() {
      let path = self.frame_path()?;
      self.draw.save_classify(&path, frame, result)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::FromUrl;
  use crate::frame::RgbNhwcFrame;
  use crate::model::DetectItem;
  use std::path::Path;
  use url::Url;

  fn record_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kantu-record-{}-{}", name, std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    dir
  }

  fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
      for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
          collect_files(&path, files);
        } else {
          files.push(path);
        }
      }
    }
  }

  fn detection() -> DetectResult {
    DetectResult {
      items: Box::new([DetectItem {
        class_id: 0,
        label: "cat".to_string(),
        score: 0.9,
        bbox: [0.25, 0.25, 0.75, 0.75],
      }]),
    }
  }

  fn output(dir: &Path, query: &str) -> DirectoryRecordOutput {
    let url = Url::parse(&format!("folder:{}{}", dir.display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  #[test]
  fn empty_result_is_skipped_by_default() {
    let dir = record_dir("skip");
    let frame = RgbNhwcFrame::<8, 8>::default();
    let empty = DetectResult { items: Box::new([]) };

    output(&dir, "").render_result(&frame, &empty).unwrap();

    let mut files = Vec::new();
    collect_files(&dir, &mut files);
    assert!(files.is_empty());

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn always_forces_write_of_empty_result() {
    let dir = record_dir("always");
    let frame = RgbNhwcFrame::<8, 8>::default();
    let empty = DetectResult { items: Box::new([]) };

    output(&dir, "?always").render_result(&frame, &empty).unwrap();

    let mut files = Vec::new();
    collect_files(&dir, &mut files);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension().unwrap(), "png");

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn record_mode_writes_json_beside_the_image() {
    let dir = record_dir("json");
    let frame = RgbNhwcFrame::<8, 8>::default();

    output(&dir, "?record=name")
      .render_result(&frame, &detection())
      .unwrap();

    let mut files = Vec::new();
    collect_files(&dir, &mut files);
    files.sort();
    assert_eq!(files.len(), 2);

    let json = files.iter().find(|p| p.extension().unwrap() == "json").unwrap();
    let png = files.iter().find(|p| p.extension().unwrap() == "png").unwrap();
    assert_eq!(json.with_extension("png"), *png);

    let content = std::fs::read_to_string(json).unwrap();
    assert!(content.contains("\"label\":\"cat\""));

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn record_id_mode_writes_numeric_labels() {
    let dir = record_dir("id");
    let frame = RgbNhwcFrame::<8, 8>::default();

    output(&dir, "?record=id")
      .render_result(&frame, &detection())
      .unwrap();

    let mut files = Vec::new();
    collect_files(&dir, &mut files);
    let json = files.iter().find(|p| p.extension().unwrap() == "json").unwrap();
    let content = std::fs::read_to_string(json).unwrap();
    assert!(content.contains("\"label\":0"));

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn frames_land_in_dated_subdirectories() {
    let dir = record_dir("dated");
    let frame = RgbNhwcFrame::<8, 8>::default();

    output(&dir, "").render_result(&frame, &detection()).unwrap();

    let now = Utc::now();
    let dated = dir
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    let mut files = Vec::new();
    collect_files(&dated, &mut files);
    assert_eq!(files.len(), 1);

    std::fs::remove_dir_all(&dir).ok();
  }
}
