// 该文件是 Kantu （看图识物） 项目的一部分。
// src/model/labels.rs - 标签表
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
use tracing::debug;

#[derive(Error, Debug)]
pub enum LabelsError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件为空: {0}")]
  Empty(String),
}

/// 类别名称表：从文本文件加载，每行一个标签，进程内只读。
#[derive(Debug, Clone)]
pub struct Labels {
  names: Box<[String]>,
}

impl Labels {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelsError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let names: Vec<String> = content
      .lines()
      .map(|line| line.trim_end().to_string())
      .filter(|line| !line.is_empty())
      .collect();

    if names.is_empty() {
      return Err(LabelsError::Empty(path.display().to_string()));
    }

    debug!("加载标签文件: {}, 标签数量: {}", path.display(), names.len());
    Ok(Labels {
      names: names.into_boxed_slice(),
    })
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(|s| s.as_str())
  }

  /// 序号越界时回退为 "unknown"。
  pub fn name_of(&self, index: usize) -> &str {
    self.get(index).unwrap_or("unknown")
  }
}

#[cfg(test)]
impl From<Vec<&str>> for Labels {
  fn from(names: Vec<&str>) -> Self {
    Labels {
      names: names
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into_boxed_slice(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn one_label_per_line_with_trailing_newline() {
    let path = std::env::temp_dir().join(format!("kantu-labels-{}.txt", std::process::id()));
    std::fs::write(&path, "background\ngoldfish\ngreat white shark\n").unwrap();

    let labels = Labels::from_file(&path).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.get(1), Some("goldfish"));
    assert_eq!(labels.name_of(2), "great white shark");
    assert_eq!(labels.name_of(100), "unknown");

    std::fs::remove_file(&path).ok();
  }

  #[test]
  fn empty_file_is_rejected() {
    let path = std::env::temp_dir().join(format!("kantu-labels-empty-{}.txt", std::process::id()));
    std::fs::write(&path, "\n\n").unwrap();

    assert!(matches!(Labels::from_file(&path), Err(LabelsError::Empty(_))));

    std::fs::remove_file(&path).ok();
  }
}
