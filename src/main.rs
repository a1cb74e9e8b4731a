// 该文件是 Huishou （回收分类） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use huishou::{
  FromUrl,
  input::InputWrapper,
  output::OutputWrapper,
  task::{BatchTask, CancelToken, OneShotTask, Task},
};

use crate::args::{Args, Mode};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let mut config = args.load_config()?;
  if let Some(frame_number) = args.frame_number {
    config.live.max_frames = frame_number;
  }

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("运行模式: {:?}", args.mode());

  let pipeline = args.pipeline_builder(&config)?.build()?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let summary = match args.mode() {
    Mode::Oneshot => OneShotTask.run_task(input, &pipeline, &output)?,
    Mode::Batch => BatchTask.run_task(input, &pipeline, &output)?,
    Mode::Live => {
      let token = CancelToken::new();
      token.install_ctrlc_handler()?;
      config
        .live
        .live_task(token)
        .run_task(input, &pipeline, &output)?
    }
  };

  summary.log();
  Ok(())
}
