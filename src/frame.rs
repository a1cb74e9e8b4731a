// 该文件是 Huishou （回收分类） 项目的一部分。
// src/frame.rs - RGB 帧定义
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
use image::{DynamicImage, Rgb, RgbImage};
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum InvalidImageError {
  #[error("图像尺寸为空: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
  #[error("不支持的像素格式: {0}")]
  UnsupportedPixelFormat(String),
  #[error("像素布局无效: {0}")]
  InvalidLayout(String),
}

/// 原始帧缓冲区的像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
  Rgb24,
  Bgr24,
  /// YUV 4:2:2 打包格式，每两个像素共用一组 U/V
  Yuyv,
  Gray8,
  Mjpeg,
}

impl PixelFormat {
  pub fn from_fourcc(fourcc: &[u8; 4]) -> Result<Self, InvalidImageError> {
    match fourcc {
      b"RGB3" => Ok(PixelFormat::Rgb24),
      b"BGR3" => Ok(PixelFormat::Bgr24),
      b"YUYV" => Ok(PixelFormat::Yuyv),
      b"GREY" => Ok(PixelFormat::Gray8),
      b"MJPG" | b"JPEG" => Ok(PixelFormat::Mjpeg),
      other => Err(InvalidImageError::UnsupportedPixelFormat(
        String::from_utf8_lossy(other).into_owned(),
      )),
    }
  }

  fn expected_len(&self, width: u32, height: u32) -> Option<usize> {
    let pixels = width as usize * height as usize;
    match self {
      PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(pixels * RGB_CHANNELS),
      PixelFormat::Yuyv => Some(pixels * 2),
      PixelFormat::Gray8 => Some(pixels),
      PixelFormat::Mjpeg => None,
    }
  }
}

/// 待分类的一帧 RGB 图像及其来源信息
#[derive(Debug, Clone)]
pub struct RgbFrame {
  image: RgbImage,
  origin: String,
  index: u64,
  captured_at: DateTime<Utc>,
}

impl RgbFrame {
  /// 从任意解码后的图像构造帧
  ///
  /// 灰度图（含透明通道、16 位）通过复制亮度值确定性地提升为三通道，
  /// 透明通道被丢弃，高位深图像转换为 8 位。
  pub fn from_dynamic(image: DynamicImage) -> Result<Self, InvalidImageError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
      return Err(InvalidImageError::EmptyImage { width, height });
    }

    let rgb = match image {
      DynamicImage::ImageRgb8(rgb) => rgb,
      other => other.to_rgb8(),
    };
    Ok(Self::from_rgb(rgb))
  }

  pub fn from_rgb_image(image: RgbImage) -> Result<Self, InvalidImageError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(InvalidImageError::EmptyImage { width, height });
    }
    Ok(Self::from_rgb(image))
  }

  fn from_rgb(image: RgbImage) -> Self {
    Self {
      image,
      origin: String::from("memory"),
      index: 0,
      captured_at: Utc::now(),
    }
  }

  /// 解码内存中的已编码图像（PNG、JPEG 等）
  pub fn decode(bytes: &[u8]) -> Result<Self, InvalidImageError> {
    let image = image::load_from_memory(bytes)?;
    Self::from_dynamic(image)
  }

  /// 从摄像头等设备的原始缓冲区构造帧
  pub fn from_raw(
    width: u32,
    height: u32,
    format: PixelFormat,
    data: &[u8],
  ) -> Result<Self, InvalidImageError> {
    if let Some(expected) = format.expected_len(width, height)
      && data.len() < expected
    {
      return Err(InvalidImageError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    let image = match format {
      // 压缩帧自带尺寸
      PixelFormat::Mjpeg => return Self::decode(data),
      _ if width == 0 || height == 0 => {
        return Err(InvalidImageError::EmptyImage { width, height });
      }
      PixelFormat::Rgb24 => {
        let len = width as usize * height as usize * RGB_CHANNELS;
        RgbImage::from_raw(width, height, data[..len].to_vec()).ok_or(
          InvalidImageError::BufferSizeMismatch {
            expected: len,
            actual: data.len(),
          },
        )?
      }
      PixelFormat::Bgr24 => RgbImage::from_fn(width, height, |x, y| {
        let idx = (y as usize * width as usize + x as usize) * RGB_CHANNELS;
        Rgb([data[idx + 2], data[idx + 1], data[idx]])
      }),
      PixelFormat::Gray8 => RgbImage::from_fn(width, height, |x, y| {
        let v = data[y as usize * width as usize + x as usize];
        Rgb([v, v, v])
      }),
      PixelFormat::Yuyv => {
        if width % 2 != 0 {
          return Err(InvalidImageError::InvalidLayout(format!(
            "YUYV 帧宽度必须为偶数, 实际为 {}",
            width
          )));
        }
        yuyv_to_rgb(width, height, data)
      }
    };

    Ok(Self::from_rgb(image))
  }

  pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
    self.origin = origin.into();
    self
  }

  pub fn with_index(mut self, index: u64) -> Self {
    self.index = index;
    self
  }

  pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
    self.captured_at = captured_at;
    self
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 帧来源描述（文件路径、设备路径等）
  pub fn origin(&self) -> &str {
    &self.origin
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn captured_at(&self) -> DateTime<Utc> {
    self.captured_at
  }

  pub fn as_rgb_image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_rgb_image(self) -> RgbImage {
    self.image
  }
}

impl AsRef<RgbImage> for RgbFrame {
  fn as_ref(&self) -> &RgbImage {
    &self.image
  }
}

// BT.601 YUV -> RGB
fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> RgbImage {
  let mut image = RgbImage::new(width, height);
  let (w, h) = (width as usize, height as usize);

  for y in 0..h {
    for pair in 0..(w / 2) {
      let idx = (y * w + pair * 2) * 2;
      let y0 = data[idx] as f32;
      let u = data[idx + 1] as f32 - 128.0;
      let y1 = data[idx + 2] as f32;
      let v = data[idx + 3] as f32 - 128.0;

      for (offset, luma) in [(0u32, y0), (1u32, y1)] {
        let r = luma + 1.402 * v;
        let g = luma - 0.344_136 * u - 0.714_136 * v;
        let b = luma + 1.772 * u;
        image.put_pixel(
          (pair * 2) as u32 + offset,
          y as u32,
          Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)]),
        );
      }
    }
  }

  image
}

fn clamp_u8(value: f32) -> u8 {
  value.round().clamp(0.0, 255.0) as u8
}
