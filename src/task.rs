// 该文件是 Huishou （回收分类） 项目的一部分。
// src/task.rs - 分类任务
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
  collections::BTreeMap,
  sync::{
    Arc, Condvar, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
  },
  time::{Duration, Instant},
};

use anyhow::{anyhow, bail};
use tracing::{debug, info, warn};

use crate::{
  model::{ClassifyError, Model, Prediction},
  output::Render,
};

/// 可跳过的错误：任务遇到时丢弃当前输入并继续
pub trait Skippable {
  fn skippable(&self) -> bool;
}

impl Skippable for ClassifyError {
  fn skippable(&self) -> bool {
    matches!(self, ClassifyError::InvalidImage(_))
  }
}

/// 任务取消令牌，可在线程间共享
#[derive(Clone, Default, Debug)]
pub struct CancelToken {
  inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    let (lock, cvar) = &*self.inner;
    *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
    cvar.notify_all();
  }

  pub fn is_cancelled(&self) -> bool {
    *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 等待指定时长，期间被取消则提前返回 `true`
  pub fn wait_timeout(&self, timeout: Duration) -> bool {
    let (lock, cvar) = &*self.inner;
    let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
    let (guard, _) = cvar
      .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
      .unwrap_or_else(PoisonError::into_inner);
    *guard
  }

  /// 第一次 Ctrl-C 取消任务，第二次强制退出
  pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
    let token = self.clone();
    let signals = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
      if signals.fetch_add(1, Ordering::SeqCst) == 0 {
        info!("收到中断信号，准备退出...");
        token.cancel();
      } else {
        warn!("再次收到中断信号，强制退出程序");
        std::process::exit(130);
      }
    })
  }
}

/// 任务结束后的统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TaskSummary {
  pub frames: usize,
  pub skipped: usize,
  pub overruns: usize,
  pub labels: BTreeMap<String, usize>,
  pub mean_latency: Option<Duration>,
}

impl TaskSummary {
  fn record(&mut self, prediction: &Prediction) {
    self.frames += 1;
    *self.labels.entry(prediction.label.clone()).or_default() += 1;
  }

  pub fn log(&self) {
    info!(
      "共分类 {} 帧，跳过 {} 帧，超出帧预算 {} 次",
      self.frames, self.skipped, self.overruns
    );
    for (label, count) in &self.labels {
      info!("  - {}: {}", label, count);
    }
    if let Some(latency) = self.mean_latency {
      info!("平均推理时间: {:.2?}", latency);
    }
  }
}

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<TaskSummary, Self::Error>;
}

/// 只分类第一帧（上传一张图片或拍一张照片）
pub struct OneShotTask;

impl<F, IE, ME, RE, I, M, O> Task<I, M, O> for OneShotTask
where
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = Prediction, Error = ME>,
  O: Render<F, Prediction, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;

    let mut summary = TaskSummary {
      mean_latency: Some(elapsed),
      ..TaskSummary::default()
    };
    summary.record(&result);
    Ok(summary)
  }
}

/// 依次分类全部输入帧，无效输入跳过
#[derive(Default, Debug)]
pub struct BatchTask;

impl<F, IE, ME, RE, I, M, O> Task<I, M, O> for BatchTask
where
  IE: std::error::Error + Skippable + Sync + Send + 'static,
  ME: std::error::Error + Skippable + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = Prediction, Error = ME>,
  O: Render<F, Prediction, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始批量任务...");
    let mut summary = TaskSummary::default();
    let mut total = Duration::ZERO;

    for (index, item) in input.enumerate() {
      let frame = match item {
        Ok(frame) => frame,
        Err(e) if e.skippable() => {
          warn!("跳过第 {} 个输入: {}", index + 1, e);
          summary.skipped += 1;
          continue;
        }
        Err(e) => return Err(e.into()),
      };

      let now = Instant::now();
      match model.infer(&frame) {
        Ok(result) => {
          total += now.elapsed();
          output.render_result(&frame, &result)?;
          summary.record(&result);
        }
        Err(e) if e.skippable() => {
          warn!("跳过第 {} 个输入: {}", index + 1, e);
          summary.skipped += 1;
        }
        Err(e) => return Err(e.into()),
      }
    }

    if summary.frames > 0 {
      summary.mean_latency = Some(total / summary.frames as u32);
    }
    info!("批量任务完成");
    Ok(summary)
  }
}

/// 重复推理同一帧，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: 1000,
      warmup: 2,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
}

impl<F, IE, ME, RE, I, M, O> Task<I, M, O> for RepeatShotTask
where
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = Prediction, Error = ME>,
  O: Render<F, Prediction, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");

    let mut summary = TaskSummary::default();
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      debug!("({})推理完成，耗时: {:.2?}", i, elapsed);
      if i == 0 {
        output.render_result(&frame, &result)?;
      }
      summary.record(&result);
      times.push(elapsed);
    }

    let warmup = if times.len() > self.warmup {
      self.warmup
    } else {
      0
    };
    let measured = &times[warmup..];
    let mean = measured.iter().sum::<Duration>() / measured.len() as u32;
    warn!("平均推理时间: {:.2?}", mean);
    summary.mean_latency = Some(mean);
    Ok(summary)
  }
}

/// 实时分类循环
///
/// 每次迭代检查一次取消令牌；帧间按固定节拍等待（等待可被取消打断）；
/// 连续失败达到上限时任务失败。
///
/// 单帧处理超过预算时只记录告警并计入 `overruns`，推理不会被中断，
/// 超时帧的结果照常交给输出。
#[derive(Debug, Clone)]
pub struct LiveTask {
  token: CancelToken,
  interval: Duration,
  frame_budget: Duration,
  frame_number: Option<usize>,
  max_consecutive_failures: usize,
}

impl Default for LiveTask {
  fn default() -> Self {
    Self {
      token: CancelToken::new(),
      interval: Duration::from_millis(100),
      frame_budget: Duration::from_millis(500),
      frame_number: None,
      max_consecutive_failures: 30,
    }
  }
}

impl LiveTask {
  pub fn with_token(mut self, token: CancelToken) -> Self {
    self.token = token;
    self
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  pub fn with_frame_budget(mut self, frame_budget: Duration) -> Self {
    self.frame_budget = frame_budget;
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number.filter(|n| *n > 0);
    self
  }

  pub fn with_max_consecutive_failures(mut self, max: usize) -> Self {
    self.max_consecutive_failures = max.max(1);
    self
  }

  pub fn token(&self) -> &CancelToken {
    &self.token
  }
}

impl<F, IE, ME, RE, I, M, O> Task<I, M, O> for LiveTask
where
  IE: std::error::Error + Skippable + Sync + Send + 'static,
  ME: std::error::Error + Skippable + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = Prediction, Error = ME>,
  O: Render<F, Prediction, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<TaskSummary, Self::Error> {
    info!(
      "开始实时任务，节拍 {:.2?}，帧预算 {:.2?}",
      self.interval, self.frame_budget
    );
    let mut summary = TaskSummary::default();
    let mut failures = 0usize;
    let mut total = Duration::ZERO;
    let mut tick = 0usize;

    loop {
      if self.token.is_cancelled() {
        warn!("任务已取消，退出任务循环");
        break;
      }

      let started = Instant::now();
      let Some(item) = input.next() else {
        info!("输入结束，退出任务循环");
        break;
      };
      tick += 1;

      let outcome = match item {
        Ok(frame) => match model.infer(&frame) {
          Ok(result) => {
            total += started.elapsed();
            output.render_result(&frame, &result)?;
            debug!("第 {} 帧: {}", tick, result.label);
            summary.record(&result);
            Ok(())
          }
          Err(e) if e.skippable() => Err(e.to_string()),
          Err(e) => return Err(e.into()),
        },
        Err(e) if e.skippable() => Err(e.to_string()),
        Err(e) => return Err(e.into()),
      };

      match outcome {
        Ok(()) => failures = 0,
        Err(reason) => {
          failures += 1;
          summary.skipped += 1;
          warn!("跳过第 {} 帧: {}", tick, reason);
          if failures >= self.max_consecutive_failures {
            bail!("连续 {} 帧失败，退出任务", failures);
          }
        }
      }

      let elapsed = started.elapsed();
      if elapsed > self.frame_budget {
        summary.overruns += 1;
        warn!(
          "第 {} 帧耗时 {:.2?}，超出帧预算 {:.2?}",
          tick, elapsed, self.frame_budget
        );
      }

      if self.frame_number.map(|n| tick >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", tick);
        break;
      }

      if let Some(rest) = self.interval.checked_sub(elapsed)
        && !rest.is_zero()
        && self.token.wait_timeout(rest)
      {
        warn!("等待期间收到取消信号，退出任务循环");
        break;
      }
    }

    if summary.frames > 0 {
      summary.mean_latency = Some(total / summary.frames as u32);
    }
    info!("任务完成，退出");
    Ok(summary)
  }
}
