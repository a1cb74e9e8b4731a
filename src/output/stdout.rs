// 该文件是 Huishou （回收分类） 项目的一部分。
// src/output/stdout.rs - JSON 行输出
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

use std::{
  io::{Stdout, Write},
  sync::{Mutex, PoisonError},
};

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::Prediction,
  output::{PredictionRecord, Render},
};

#[derive(Error, Debug)]
pub enum StdoutOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每个分类结果输出一行 JSON
pub struct StdoutOutput<W: Write = Stdout> {
  writer: Mutex<W>,
}

impl FromUrlWithScheme for StdoutOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for StdoutOutput {
  type Error = StdoutOutputError;

  fn from_url(_url: &Url) -> Result<Self, Self::Error> {
    Ok(StdoutOutput::with_writer(std::io::stdout()))
  }
}

impl<W: Write> StdoutOutput<W> {
  pub fn with_writer(writer: W) -> Self {
    StdoutOutput {
      writer: Mutex::new(writer),
    }
  }

  pub fn into_writer(self) -> W {
    self
      .writer
      .into_inner()
      .unwrap_or_else(PoisonError::into_inner)
  }
}

impl<W: Write> Render<RgbFrame, Prediction> for StdoutOutput<W> {
  type Error = StdoutOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &Prediction) -> Result<(), Self::Error> {
    let record = PredictionRecord::new(frame, result);
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    serde_json::to_writer(&mut *writer, &record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn writes_one_json_object_per_line() {
    let output = StdoutOutput::with_writer(Vec::new());
    for (i, label) in ["Paper", "Plastic"].iter().enumerate() {
      let frame = RgbFrame::from_rgb_image(RgbImage::new(4, 4))
        .unwrap()
        .with_origin(format!("img-{}.png", i))
        .with_index(i as u64);
      let prediction = Prediction {
        index: i,
        label: label.to_string(),
        scores: vec![1.0, 1.0].into_boxed_slice(),
      };
      output.render_result(&frame, &prediction).unwrap();
    }

    let text = String::from_utf8(output.into_writer()).unwrap();
    let records: Vec<PredictionRecord> = text
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].origin, "img-0.png");
    assert_eq!(records[1].label, "Plastic");
    assert_eq!(records[1].frame, 1);
    assert!((records[0].confidence - 0.5).abs() < 1e-6);
  }
}
