// 该文件是 Huishou （回收分类） 项目的一部分。
// src/model/preprocess.rs - 图像预处理
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

use image::{Rgb, RgbImage, imageops::FilterType};
use serde::Deserialize;
use tract_onnx::prelude::tract_ndarray::Array4;

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (224, 224);
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
  /// 直接拉伸到目标尺寸，不保持宽高比（与训练时的变换一致）
  #[default]
  Stretch,
  /// 保持宽高比缩放，空白区域以均值色填充
  Letterbox,
}

impl std::str::FromStr for ResizeMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "stretch" => Ok(ResizeMode::Stretch),
      "letterbox" => Ok(ResizeMode::Letterbox),
      other => Err(format!("未知的缩放方式: {}", other)),
    }
  }
}

/// 预处理参数：目标尺寸、逐通道均值与标准差
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocess {
  pub width: u32,
  pub height: u32,
  pub mean: [f32; 3],
  pub std: [f32; 3],
  pub resize: ResizeMode,
  pub filter: FilterType,
}

impl Default for Preprocess {
  fn default() -> Self {
    Self {
      width: DEFAULT_INPUT_SIZE.0,
      height: DEFAULT_INPUT_SIZE.1,
      mean: IMAGENET_MEAN,
      std: IMAGENET_STD,
      resize: ResizeMode::Stretch,
      filter: FilterType::Triangle,
    }
  }
}

impl Preprocess {
  pub fn with_size(mut self, width: u32, height: u32) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  pub fn with_resize(mut self, resize: ResizeMode) -> Self {
    self.resize = resize;
    self
  }

  pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
    self.mean = mean;
    self.std = std;
    self
  }

  /// 缩放到模型输入尺寸；尺寸已匹配时原样复制
  pub fn resize(&self, image: &RgbImage) -> RgbImage {
    if image.dimensions() == (self.width, self.height) {
      return image.clone();
    }

    match self.resize {
      ResizeMode::Stretch => image::imageops::resize(image, self.width, self.height, self.filter),
      ResizeMode::Letterbox => self.letterbox(image),
    }
  }

  fn letterbox(&self, image: &RgbImage) -> RgbImage {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let scale = (self.width as f32 / w).min(self.height as f32 / h);
    let new_w = ((w * scale).round() as u32).clamp(1, self.width);
    let new_h = ((h * scale).round() as u32).clamp(1, self.height);

    let scaled = image::imageops::resize(image, new_w, new_h, self.filter);
    let mut canvas = RgbImage::from_pixel(self.width, self.height, self.mean_pixel());
    let x_offset = (self.width - new_w) / 2;
    let y_offset = (self.height - new_h) / 2;
    image::imageops::replace(&mut canvas, &scaled, x_offset as i64, y_offset as i64);
    canvas
  }

  // 归一化后约为零的填充色
  fn mean_pixel(&self) -> Rgb<u8> {
    Rgb(self.mean.map(|m| (m * 255.0).round().clamp(0.0, 255.0) as u8))
  }

  /// 缩放并转换为 NCHW 布局的归一化张量数据 `[1, 3, H, W]`
  pub fn to_tensor(&self, image: &RgbImage) -> Array4<f32> {
    let resized = self.resize(image);
    let (width, height) = (self.width as usize, self.height as usize);
    Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
      let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
      (value - self.mean[c]) / self.std[c]
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stretch_ignores_aspect_ratio() {
    let image = RgbImage::from_pixel(400, 100, Rgb([255, 0, 0]));
    let resized = Preprocess::default().resize(&image);
    assert_eq!(resized.dimensions(), (224, 224));
    assert_eq!(resized.get_pixel(0, 0).0, [255, 0, 0]);
    assert_eq!(resized.get_pixel(223, 223).0, [255, 0, 0]);
  }

  #[test]
  fn letterbox_pads_with_mean_color() {
    let image = RgbImage::from_pixel(400, 100, Rgb([255, 0, 0]));
    let preprocess = Preprocess::default().with_resize(ResizeMode::Letterbox);
    let resized = preprocess.resize(&image);
    assert_eq!(resized.dimensions(), (224, 224));
    assert_eq!(resized.get_pixel(112, 112).0, [255, 0, 0]);
    assert_eq!(resized.get_pixel(112, 0).0, [124, 116, 104]);
  }

  #[test]
  fn target_sized_image_is_untouched() {
    let image = RgbImage::from_fn(224, 224, |x, y| Rgb([x as u8, y as u8, 7]));
    let resized = Preprocess::default().resize(&image);
    assert_eq!(resized, image);
  }

  #[test]
  fn single_pixel_resizes() {
    let image = RgbImage::from_pixel(1, 1, Rgb([10, 20, 30]));
    let tensor = Preprocess::default().to_tensor(&image);
    assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
  }

  #[test]
  fn tensor_is_normalized_nchw() {
    let image = RgbImage::from_pixel(224, 224, Rgb([255, 0, 128]));
    let preprocess = Preprocess::default();
    let tensor = preprocess.to_tensor(&image);
    assert_eq!(tensor.shape(), &[1, 3, 224, 224]);

    let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
    let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
    let blue = (128.0 / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
    assert!((tensor[[0, 0, 5, 9]] - red).abs() < 1e-5);
    assert!((tensor[[0, 1, 5, 9]] - green).abs() < 1e-5);
    assert!((tensor[[0, 2, 5, 9]] - blue).abs() < 1e-5);
  }

  #[test]
  fn resize_mode_from_str() {
    assert_eq!("Letterbox".parse::<ResizeMode>(), Ok(ResizeMode::Letterbox));
    assert_eq!("stretch".parse::<ResizeMode>(), Ok(ResizeMode::Stretch));
    assert!("crop".parse::<ResizeMode>().is_err());
  }
}
