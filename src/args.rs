// 该文件是 Huishou （回收分类） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

use huishou::{
  FromUrl, FromUrlWithScheme, ModelLoadError, PipelineBuilder,
  config::{Config, ConfigError},
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  /// 只分类第一帧
  Oneshot,
  /// 分类全部输入
  Batch,
  /// 实时分类，Ctrl-C 退出
  Live,
}

/// Huishou 回收分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// ONNX 模型，可以是文件路径或 URL
  /// - 路径: garbage_resnet18.onnx（预处理与标签取自配置文件）
  /// - URL: onnx:///path/model.onnx?labels=labels.toml&resize=letterbox
  #[arg(long, value_name = "MODEL")]
  pub model: Option<String>,

  /// 标签文件（.toml 或每行一个标签的文本文件）
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 输入来源
  /// - 图片文件或目录: image:///path/to/photo.jpg
  /// - V4L 摄像头: v4l:///dev/video0?width=640&height=480&mode=oneshot
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出
  /// - log:// 、 stdout://
  /// - 图片文件: image:///path/to/result.png
  /// - 目录记录: folder:///path/to/records?draw
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,

  /// 运行模式；未指定时摄像头输入为 live，其余为 batch
  #[arg(long, value_enum)]
  pub mode: Option<Mode>,

  /// 最大处理帧数（仅 live 模式，0 表示无限制）
  #[arg(long, value_name = "COUNT")]
  pub frame_number: Option<usize>,
}

impl Args {
  pub fn load_config(&self) -> Result<Config, ConfigError> {
    match &self.config {
      Some(path) => Config::from_path(path),
      None => Ok(Config::default()),
    }
  }

  pub fn mode(&self) -> Mode {
    match self.mode {
      Some(mode) => mode,
      None if self.input.scheme() == "v4l" => Mode::Live,
      None => Mode::Batch,
    }
  }

  /// 命令行参数优先于配置文件
  pub fn pipeline_builder(&self, config: &Config) -> anyhow::Result<PipelineBuilder> {
    let builder = match &self.model {
      Some(model) => match Url::parse(model) {
        Ok(url) if url.scheme() == PipelineBuilder::SCHEME => PipelineBuilder::from_url(&url)?,
        Ok(url) if url.scheme().len() > 1 => {
          return Err(ModelLoadError::ModelPathError(format!("不支持的模型 URL: {}", url)).into());
        }
        _ => config
          .labels
          .configure(PipelineBuilder::new(model).preprocess(config.model.preprocess()))?,
      },
      None => config.pipeline_builder()?,
    };

    Ok(match &self.labels {
      Some(path) => builder.labels_path(path),
      None => builder,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(args: &[&str]) -> Args {
    Args::parse_from(std::iter::once("huishou").chain(args.iter().copied()))
  }

  #[test]
  fn mode_defaults_follow_input() {
    assert_eq!(parse(&["--input", "v4l:///dev/video0"]).mode(), Mode::Live);
    assert_eq!(parse(&["--input", "image:///tmp/a.png"]).mode(), Mode::Batch);
    assert_eq!(
      parse(&["--input", "v4l:///dev/video0", "--mode", "oneshot"]).mode(),
      Mode::Oneshot
    );
  }

  #[test]
  fn output_defaults_to_log() {
    assert_eq!(parse(&["--input", "image:///tmp/a.png"]).output.scheme(), "log");
  }

  #[test]
  fn model_is_required_somewhere() {
    let args = parse(&["--input", "image:///tmp/a.png"]);
    assert!(args.pipeline_builder(&Config::default()).is_err());

    let args = parse(&["--input", "image:///tmp/a.png", "--model", "model.onnx"]);
    assert!(args.pipeline_builder(&Config::default()).is_ok());

    let args = parse(&["--input", "image:///tmp/a.png", "--model", "tflite:///m.tflite"]);
    assert!(args.pipeline_builder(&Config::default()).is_err());
  }

  #[test]
  fn label_file_is_read_when_the_model_loads() {
    let config = Config::from_toml_str("[labels]\nfile = \"/nonexistent/labels.toml\"").unwrap();
    let args = parse(&["--input", "image:///tmp/a.png", "--model", "model.onnx"]);
    let builder = args.pipeline_builder(&config).unwrap();
    assert!(matches!(builder.build(), Err(ModelLoadError::Labels(_))));
  }
}
