// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/model/labels.rs - 类别标签
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

use std::{borrow::Cow, path::Path};

use thiserror::Error;
use tracing::{info, warn};

/// 标签文件缺失或无法读取时使用的默认类别
pub const DEFAULT_LABELS: [&str; 4] = [
  "Alive Rhizophora",
  "Alive Trunk",
  "Dead Rhizophora",
  "Dead Trunk",
];

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件为空: {0}")]
  Empty(String),
}

/// 有序的类别名称，下标 i 对应输出张量第 4 + i 行
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
  names: Box<[String]>,
}

impl LabelSet {
  pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
    Self {
      names: names.into_iter().map(Into::into).collect(),
    }
  }

  /// 按行解析，忽略空行与行尾空白
  pub fn parse(text: &str) -> Self {
    Self::new(
      text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty()),
    )
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let labels = Self::parse(&std::fs::read_to_string(path)?);
    if labels.is_empty() {
      return Err(LabelError::Empty(path.display().to_string()));
    }
    Ok(labels)
  }

  /// 读取标签文件，失败时退回到默认标签
  pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
    let path = path.as_ref();
    match Self::from_file(path) {
      Ok(labels) => {
        info!("已加载 {} 个类别标签: {}", labels.len(), path.display());
        labels
      }
      Err(e) => {
        warn!("无法加载标签文件 {}: {}，使用默认标签", path.display(), e);
        Self::default_labels()
      }
    }
  }

  pub fn default_labels() -> Self {
    Self::new(DEFAULT_LABELS)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(String::as_str)
  }

  /// 类别名称，越界时为 "Class <i>"
  pub fn label(&self, index: usize) -> Cow<'_, str> {
    match self.get(index) {
      Some(name) => Cow::Borrowed(name),
      None => Cow::Owned(format!("Class {}", index)),
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn parse_keeps_order_and_skips_blank_lines() {
    let labels = LabelSet::parse("Alive Rhizophora\r\nAlive Trunk\n\nDead Trunk  \n");
    assert_eq!(
      labels.iter().collect::<Vec<_>>(),
      vec!["Alive Rhizophora", "Alive Trunk", "Dead Trunk"]
    );
  }

  #[test]
  fn out_of_range_index_falls_back_to_class_text() {
    let labels = LabelSet::default_labels();
    assert_eq!(labels.label(1), "Alive Trunk");
    assert_eq!(labels.label(4), "Class 4");
    assert_eq!(LabelSet::default().label(2), "Class 2");
  }

  #[test]
  fn reads_label_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "mangrove").unwrap();
    writeln!(file, "stump").unwrap();

    let labels = LabelSet::from_file(file.path()).unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels.get(1), Some("stump"));
  }

  #[test]
  fn missing_file_uses_default_labels() {
    let dir = tempfile::tempdir().unwrap();
    let labels = LabelSet::load_or_default(dir.path().join("labels.txt"));
    assert_eq!(labels, LabelSet::default_labels());
  }

  #[test]
  fn empty_file_uses_default_labels() {
    let file = tempfile::NamedTempFile::new().unwrap();
    assert!(matches!(
      LabelSet::from_file(file.path()),
      Err(LabelError::Empty(_))
    ));
    assert_eq!(
      LabelSet::load_or_default(file.path()),
      LabelSet::default_labels()
    );
  }
}
