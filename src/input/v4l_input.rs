// 该文件是 Huishou （回收分类） 项目的一部分。
// src/input/v4l_input.rs - V4L 摄像头输入
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

//! # V4L 摄像头输入
//!
//! URL 格式: `v4l:///dev/video0?width=640&height=480&mode=stream`
//!
//! - `mode=stream`（默认）: 持续采集，适用于实时分类
//! - `mode=oneshot`: 打开设备采集一帧后立即释放设备，适用于单次拍照分类
//!
//! 采集格式按 MJPG、YUYV、RGB3 的顺序协商，统一转换为 RGB 帧。
//! 单帧读取失败时迭代器产出错误项而不是结束，由任务决定跳过还是退出。

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;
use v4l::{
  Device, FourCC,
  buffer::Type,
  format::Format,
  io::{mmap::Stream, traits::CaptureStream},
  video::Capture,
};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{InvalidImageError, PixelFormat, RgbFrame},
  task::Skippable,
  url_path, url_query,
};

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);
const PREFERRED_FOURCC: [&[u8; 4]; 3] = [b"MJPG", b"YUYV", b"RGB3"];

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("V4L I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid query parameter: {0}")]
  InvalidQuery(String),
  #[error("No supported pixel format, device offers {0}")]
  UnsupportedPixelFormat(String),
  #[error("Invalid frame: {0}")]
  InvalidFrame(#[from] InvalidImageError),
}

impl Skippable for V4lInputError {
  // 单帧读取失败直接跳过，下一次节拍再试
  fn skippable(&self) -> bool {
    matches!(self, V4lInputError::IoError(_) | V4lInputError::InvalidFrame(_))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
  Stream,
  OneShot,
}

pub struct V4lInput {
  device_path: String,
  device: Device,
  stream: Option<Stream<'static>>,
  width: u32,
  height: u32,
  format: PixelFormat,
  mode: CaptureMode,
  index: u64,
  finished: bool,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

fn parse_query<T: std::str::FromStr>(
  url: &Url,
  name: &str,
  default: T,
) -> Result<T, V4lInputError> {
  match url_query(url, name) {
    Some(value) => value
      .parse()
      .map_err(|_| V4lInputError::InvalidQuery(format!("{}={}", name, value))),
    None => Ok(default),
  }
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    // v4l:///dev/video0 或 v4l://localhost/dev/video0
    let device_path = match url_path(url) {
      path if path.is_empty() || path == "/" => DEFAULT_DEVICE.to_string(),
      path => path,
    };
    let width = parse_query(url, "width", DEFAULT_WIDTH)?;
    let height = parse_query(url, "height", DEFAULT_HEIGHT)?;
    let mode = match url_query(url, "mode").as_deref() {
      None | Some("stream") => CaptureMode::Stream,
      Some("oneshot") => CaptureMode::OneShot,
      Some(other) => return Err(V4lInputError::InvalidQuery(format!("mode={}", other))),
    };

    Self::open(&device_path, width, height, mode)
  }
}

impl V4lInput {
  pub fn open(
    device_path: &str,
    width: u32,
    height: u32,
    mode: CaptureMode,
  ) -> Result<Self, V4lInputError> {
    info!("打开摄像头设备: {}", device_path);
    let device = Device::with_path(device_path)?;
    let (format, width, height) = negotiate_format(&device, width, height)?;
    info!(
      "摄像头采集格式: {:?} {}x{} ({:?})",
      format, width, height, mode
    );

    Ok(V4lInput {
      device_path: device_path.to_string(),
      device,
      stream: None,
      width,
      height,
      format,
      mode,
      index: 0,
      finished: false,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  fn stream(&mut self) -> Result<&mut Stream<'static>, V4lInputError> {
    if self.stream.is_none() {
      debug!("创建采集流，缓冲区数量 {}", STREAM_BUFFERS);
      let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, STREAM_BUFFERS)?;
      stream.set_timeout(CAPTURE_TIMEOUT);
      self.stream = Some(stream);
    }
    self
      .stream
      .as_mut()
      .ok_or_else(|| V4lInputError::IoError(std::io::Error::other("采集流不可用")))
  }

  fn capture_frame(&mut self) -> Result<RgbFrame, V4lInputError> {
    let (width, height, format) = (self.width, self.height, self.format);
    let stream = self.stream()?;
    let (buf, meta) = CaptureStream::next(stream)?;
    let used = (meta.bytesused as usize).min(buf.len());
    let data = if used == 0 { buf } else { &buf[..used] };
    Ok(RgbFrame::from_raw(width, height, format, data)?)
  }
}

fn negotiate_format(
  device: &Device,
  width: u32,
  height: u32,
) -> Result<(PixelFormat, u32, u32), V4lInputError> {
  let mut offered = Vec::new();
  for fourcc in PREFERRED_FOURCC {
    let requested = Format::new(width, height, FourCC::new(fourcc));
    let actual = device.set_format(&requested)?;
    match PixelFormat::from_fourcc(&actual.fourcc.repr) {
      Ok(format) if actual.fourcc.repr == *fourcc => {
        return Ok((format, actual.width, actual.height));
      }
      _ => offered.push(String::from_utf8_lossy(&actual.fourcc.repr).into_owned()),
    }
  }

  // 设备拒绝了所有请求时，接受其当前格式（若可转换）
  let current = device.format()?;
  match PixelFormat::from_fourcc(&current.fourcc.repr) {
    Ok(format) => Ok((format, current.width, current.height)),
    Err(_) => Err(V4lInputError::UnsupportedPixelFormat(offered.join(","))),
  }
}

impl Iterator for V4lInput {
  type Item = Result<RgbFrame, V4lInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let result = self.capture_frame().map(|frame| {
      frame
        .with_origin(self.device_path.clone())
        .with_index(self.index)
        .with_captured_at(Utc::now())
    });
    self.index += 1;

    if let Err(e) = &result {
      warn!("采集第 {} 帧失败: {}", self.index, e);
    }

    if self.mode == CaptureMode::OneShot {
      // 单次拍照后释放采集流
      self.stream = None;
      self.finished = true;
    }

    Some(result)
  }
}
