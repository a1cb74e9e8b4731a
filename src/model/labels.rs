// 该文件是 Huishou （回收分类） 项目的一部分。
// src/model/labels.rs - 类别标签集合
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Huishou Authors

use std::{collections::HashSet, path::Path, sync::Arc};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// 默认的 12 类垃圾分类标签，顺序即模型输出的类别索引
pub const GARBAGE_LABELS: [&str; 12] = [
  "Battery",
  "Biological",
  "Brown-Glass",
  "Cardboard",
  "Clothes",
  "Green-Glass",
  "Metal",
  "Paper",
  "Plastic",
  "Shoes",
  "Trash",
  "White-Glass",
];

#[derive(Error, Debug)]
pub enum LabelSetError {
  #[error("标签集合为空")]
  Empty,
  #[error("标签重复: {0}")]
  Duplicate(String),
  #[error("标签文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
}

#[derive(Deserialize)]
struct LabelFile {
  labels: Vec<String>,
}

/// 有序且不可变的类别名称列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
  labels: Arc<[String]>,
}

impl LabelSet {
  pub fn new<I, S>(labels: I) -> Result<Self, LabelSetError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
    if labels.is_empty() {
      return Err(LabelSetError::Empty);
    }

    let mut seen = HashSet::with_capacity(labels.len());
    for label in &labels {
      if !seen.insert(label.as_str()) {
        return Err(LabelSetError::Duplicate(label.clone()));
      }
    }

    Ok(Self {
      labels: labels.into(),
    })
  }

  pub fn garbage() -> Self {
    Self {
      labels: GARBAGE_LABELS.iter().map(|s| s.to_string()).collect(),
    }
  }

  /// 从文件读取标签
  ///
  /// `.toml` 文件需包含 `labels = [...]`；其余文件按每行一个标签解析，
  /// 空行与 `#` 开头的注释行被忽略。
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelSetError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    debug!("读取标签文件: {}", path.display());

    let is_toml = path
      .extension()
      .map(|ext| ext.eq_ignore_ascii_case("toml"))
      .unwrap_or(false);
    if is_toml {
      Self::from_toml_str(&content)
    } else {
      Self::from_lines(&content)
    }
  }

  pub fn from_toml_str(content: &str) -> Result<Self, LabelSetError> {
    let file: LabelFile = toml::from_str(content)?;
    Self::new(file.labels)
  }

  pub fn from_lines(content: &str) -> Result<Self, LabelSetError> {
    Self::new(
      content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn index_of(&self, label: &str) -> Option<usize> {
    self.labels.iter().position(|l| l == label)
  }

  pub fn contains(&self, label: &str) -> bool {
    self.index_of(label).is_some()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl Default for LabelSet {
  fn default() -> Self {
    Self::garbage()
  }
}
