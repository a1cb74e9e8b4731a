// 该文件是 Huishou （回收分类） 项目的一部分。
// src/config.rs - 配置文件
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

//! TOML 配置文件，所有字段都有默认值：
//!
//! ```toml
//! [model]
//! path = "garbage_resnet18.onnx"
//! input_size = [224, 224]
//! resize = "stretch"
//!
//! [labels]
//! file = "labels/garbage.toml"
//!
//! [live]
//! interval_ms = 100
//! frame_budget_ms = 500
//! ```
//!
//! 配置文件中的相对路径以配置文件所在目录为基准。

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  model::{
    IMAGENET_MEAN, IMAGENET_STD, LabelSet, LabelSetError, PipelineBuilder, Preprocess, ResizeMode,
  },
  task::{CancelToken, LiveTask},
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {path}: {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("配置文件格式错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("配置错误: {0}")]
  Invalid(String),
  #[error("标签配置错误: {0}")]
  Labels(#[from] LabelSetError),
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub model: ModelConfig,
  pub labels: LabelsConfig,
  pub live: LiveConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
  pub path: Option<PathBuf>,
  /// `[宽, 高]`
  pub input_size: [u32; 2],
  pub mean: [f32; 3],
  pub std: [f32; 3],
  pub resize: ResizeMode,
}

impl Default for ModelConfig {
  fn default() -> Self {
    let preprocess = Preprocess::default();
    Self {
      path: None,
      input_size: [preprocess.width, preprocess.height],
      mean: IMAGENET_MEAN,
      std: IMAGENET_STD,
      resize: ResizeMode::default(),
    }
  }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LabelsConfig {
  pub names: Option<Vec<String>>,
  pub file: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LiveConfig {
  pub interval_ms: u64,
  pub frame_budget_ms: u64,
  pub max_consecutive_failures: usize,
  /// 0 表示不限制
  pub max_frames: usize,
}

impl Default for LiveConfig {
  fn default() -> Self {
    Self {
      interval_ms: 100,
      frame_budget_ms: 500,
      max_consecutive_failures: 30,
      max_frames: 0,
    }
  }
}

impl Config {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    debug!("读取配置文件: {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config = Self::from_toml_str(&content)?;
    if let Some(base) = path.parent() {
      config.resolve_paths(base);
    }
    Ok(config)
  }

  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    let [width, height] = self.model.input_size;
    if width == 0 || height == 0 {
      return Err(ConfigError::Invalid(format!(
        "model.input_size 必须为正数, 实际为 [{}, {}]",
        width, height
      )));
    }
    if self.model.std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
      return Err(ConfigError::Invalid(
        "model.std 不能包含 0 或非有限值".to_string(),
      ));
    }
    if self.live.max_consecutive_failures == 0 {
      return Err(ConfigError::Invalid(
        "live.max_consecutive_failures 必须大于 0".to_string(),
      ));
    }
    Ok(())
  }

  fn resolve_paths(&mut self, base: &Path) {
    let resolve = |path: &mut PathBuf| {
      if path.is_relative() {
        *path = base.join(&*path);
      }
    };
    if let Some(path) = self.model.path.as_mut() {
      resolve(path);
    }
    if let Some(path) = self.labels.file.as_mut() {
      resolve(path);
    }
  }

  /// 由配置构造模型加载器；`model.path` 未设置时报错
  pub fn pipeline_builder(&self) -> Result<PipelineBuilder, ConfigError> {
    let path = self
      .model
      .path
      .as_ref()
      .ok_or_else(|| ConfigError::Invalid("未指定模型文件 (model.path)".to_string()))?;
    let builder = PipelineBuilder::new(path).preprocess(self.model.preprocess());
    Ok(self.labels.configure(builder)?)
  }
}

impl ModelConfig {
  pub fn preprocess(&self) -> Preprocess {
    let [width, height] = self.input_size;
    Preprocess::default()
      .with_size(width, height)
      .with_normalization(self.mean, self.std)
      .with_resize(self.resize)
  }
}

impl LabelsConfig {
  /// 把标签配置交给加载器：标签文件推迟到 `build()` 时读取，
  /// 读取失败与直接加载模型时一样报告为 `ModelLoadError::Labels`
  pub fn configure(&self, builder: PipelineBuilder) -> Result<PipelineBuilder, LabelSetError> {
    match (&self.names, &self.file) {
      (Some(_), _) => Ok(builder.labels(self.label_set()?)),
      (None, Some(file)) => Ok(builder.labels_path(file)),
      (None, None) => Ok(builder),
    }
  }

  pub fn label_set(&self) -> Result<LabelSet, LabelSetError> {
    match (&self.names, &self.file) {
      (Some(names), file) => {
        if let Some(file) = file {
          warn!("同时配置了 labels.names 与 labels.file, 忽略 {}", file.display());
        }
        LabelSet::new(names.iter().cloned())
      }
      (None, Some(file)) => LabelSet::from_path(file),
      (None, None) => Ok(LabelSet::garbage()),
    }
  }
}

impl LiveConfig {
  pub fn live_task(&self, token: CancelToken) -> LiveTask {
    LiveTask::default()
      .with_token(token)
      .with_interval(Duration::from_millis(self.interval_ms))
      .with_frame_budget(Duration::from_millis(self.frame_budget_ms))
      .with_frame_number(Some(self.max_frames))
      .with_max_consecutive_failures(self.max_consecutive_failures)
  }
}
