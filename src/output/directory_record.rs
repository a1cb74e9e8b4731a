// 该文件是 Huishou （回收分类） 项目的一部分。
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
// Copyright (C) 2026 Huishou Authors

//! 按日期归档每一帧：`dir/YYYY/MM/DD/HH-MM-SS-NNNN.png`，
//! 同名 `.json` 文件记录分类结果。带 `?draw` 时保存标注后的图像。

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use ab_glyph::InvalidFont;
use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::Prediction,
  output::{PredictionRecord, Render, draw::Draw},
  url_has_flag, url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("字体错误: {0}")]
  FontError(#[from] InvalidFont),
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Option<Draw>,
  frame_counter: Mutex<u16>,
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

    Self::new(url_path(uri), url_has_flag(uri, "draw"))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, draw: bool) -> Result<Self, DirectoryRecordOutputError> {
    let draw = if draw { Some(Draw::new()?) } else { None };
    Ok(DirectoryRecordOutput {
      directory: directory.into(),
      draw,
      frame_counter: Mutex::new(0),
    })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self, at: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(at.year().to_string())
      .join(format!("{:02}", at.month()))
      .join(format!("{:02}", at.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      at.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbFrame, Prediction> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &Prediction) -> Result<(), Self::Error> {
    let path = self.frame_path(frame.captured_at())?;

    match &self.draw {
      Some(draw) => draw.annotate(frame, result).save(&path)?,
      None => frame.as_rgb_image().save(&path)?,
    }

    let record = PredictionRecord::new(frame, result);
    let mut sidecar = BufWriter::new(File::create(path.with_extension("json"))?);
    serde_json::to_writer_pretty(&mut sidecar, &record)?;
    sidecar.flush()?;

    debug!("记录已写入: {}", path.display());
    info!("保存 {} 分类结果到 {}", result.label, path.display());
    Ok(())
  }
}
