// 该文件是 Huishou （回收分类） 项目的一部分。
// src/output.rs - 输出定义
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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, model::Prediction};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

impl<Frame, Output, T: Render<Frame, Output>> Render<Frame, Output> for &T {
  type Error = T::Error;

  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error> {
    (**self).render_result(frame, result)
  }
}

/// 一次分类的记录，用于 JSON 输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
  pub origin: String,
  pub frame: u64,
  pub index: usize,
  pub label: String,
  pub confidence: f32,
  pub captured_at: DateTime<Utc>,
}

impl PredictionRecord {
  pub fn new(frame: &RgbFrame, prediction: &Prediction) -> Self {
    PredictionRecord {
      origin: frame.origin().to_string(),
      frame: frame.index(),
      index: prediction.index,
      label: prediction.label.clone(),
      confidence: prediction.confidence(),
      captured_at: frame.captured_at(),
    }
  }
}

#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
pub mod draw;

mod log;
pub use self::log::LogOutput;

mod stdout;
pub use self::stdout::{StdoutOutput, StdoutOutputError};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("标准输出错误: {0}")]
  StdoutOutputError(#[from] StdoutOutputError),
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  LogOutput(LogOutput),
  StdoutOutput(StdoutOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::LogOutput(LogOutput)),
      <StdoutOutput>::SCHEME => Ok(OutputWrapper::StdoutOutput(StdoutOutput::from_url(url)?)),
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<RgbFrame, Prediction> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbFrame, result: &Prediction) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::LogOutput(output) => output
        .render_result(frame, result)
        .map_err(|never| match never {}),
      OutputWrapper::StdoutOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dispatches_by_scheme() {
    let log = OutputWrapper::from_url(&Url::parse("log://").unwrap()).unwrap();
    assert!(matches!(log, OutputWrapper::LogOutput(_)));
    let stdout = OutputWrapper::from_url(&Url::parse("stdout://").unwrap()).unwrap();
    assert!(matches!(stdout, OutputWrapper::StdoutOutput(_)));
  }

  #[test]
  fn rejects_unknown_scheme() {
    let url = Url::parse("rtsp://0.0.0.0:8554/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(scheme)) if scheme == "rtsp"
    ));
  }

  #[test]
  fn record_carries_frame_metadata() {
    let frame = RgbFrame::from_rgb_image(image::RgbImage::new(2, 2))
      .unwrap()
      .with_origin("bin-camera")
      .with_index(7);
    let prediction = Prediction {
      index: 1,
      label: "Biological".to_string(),
      scores: vec![0.0, 2.0].into_boxed_slice(),
    };
    let record = PredictionRecord::new(&frame, &prediction);
    assert_eq!(record.origin, "bin-camera");
    assert_eq!(record.frame, 7);
    assert_eq!(record.label, "Biological");
    assert!(record.confidence > 0.8);
  }
}
