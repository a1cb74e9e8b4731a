// 该文件是 Huishou （回收分类） 项目的一部分。
// src/output/draw.rs - 分类结果可视化
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

use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};

use crate::{frame::RgbFrame, model::Prediction};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_PADDING: i32 = 4;
const BANNER_COLOR: [u8; 3] = [0, 128, 0]; // 绿色
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

static FONT_DATA: &[u8] = include_bytes!("../../assets/font.ttf");

/// 在图像左上角绘制 "标签 置信度" 横幅
pub struct Draw {
  font: FontRef<'static>,
  font_size: f32,
  padding: i32,
  banner_color: [u8; 3],
  text_color: [u8; 3],
}

impl Draw {
  pub fn new() -> Result<Self, InvalidFont> {
    let font = FontRef::try_from_slice(FONT_DATA)?;
    Ok(Self {
      font,
      font_size: LABEL_FONT_SIZE,
      padding: LABEL_PADDING,
      banner_color: BANNER_COLOR,
      text_color: TEXT_COLOR,
    })
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn with_banner_color(mut self, color: [u8; 3]) -> Self {
    self.banner_color = color;
    self
  }

  pub fn label_text(prediction: &Prediction) -> String {
    format!("{} {:.2}", prediction.label, prediction.confidence())
  }

  pub fn draw_label(&self, image: &mut RgbImage, prediction: &Prediction) {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
      return;
    }

    // 小图像上缩小字号，横幅不超过图像高度的一半
    let font_size = self.font_size.min(h as f32 / 2.0).max(1.0);
    let scale = PxScale::from(font_size);
    let label = Self::label_text(prediction);
    let (text_w, text_h) = text_size(scale, &self.font, &label);

    let banner_w = (text_w + 2 * self.padding as u32).clamp(1, w);
    let banner_h = (text_h + 2 * self.padding as u32).clamp(1, h);
    let rect = Rect::at(0, 0).of_size(banner_w, banner_h);
    draw_filled_rect_mut(image, rect, Rgb(self.banner_color));

    draw_text_mut(
      image,
      Rgb(self.text_color),
      self.padding,
      self.padding,
      scale,
      &self.font,
      &label,
    );
  }

  pub fn annotate(&self, frame: &RgbFrame, prediction: &Prediction) -> RgbImage {
    let mut image = frame.as_rgb_image().clone();
    self.draw_label(&mut image, prediction);
    image
  }
}
