// 该文件是 Huishou （回收分类） 项目的一部分。
// src/output/log.rs - 日志输出
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

use std::convert::Infallible;

use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, model::Prediction, output::Render};

/// 只把分类结果写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(_url: &Url) -> Result<Self, Self::Error> {
    Ok(LogOutput)
  }
}

impl Render<RgbFrame, Prediction> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &RgbFrame, result: &Prediction) -> Result<(), Self::Error> {
    info!(
      "{} -> {} ({:.2}%)",
      frame.origin(),
      result.label,
      result.confidence() * 100.0
    );
    Ok(())
  }
}
