// 该文件是 Huishou （回收分类） 项目的一部分。
// tests/pipeline.rs - 分类管线集成测试
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

//! 测试模型由 `scripts/make_tiny_classifier.py` 生成：
//! 全局平均池化后接一个 3 -> N 的全连接层。
//! 12 类模型中红、绿、蓝分别偏向 0、1、2 号类别，6 号类别（Metal）带 0.5 偏置，
//! 因此接近中性的颜色都会落到 Metal。

use std::{io::Cursor, path::PathBuf};

use image::{
  DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, LumaA, Luma, Rgb, RgbImage, Rgba,
  RgbaImage,
};

use huishou::{
  ClassifyError, LabelSet, ModelLoadError, Pipeline, PipelineBuilder, Preprocess, ResizeMode,
  model::GARBAGE_LABELS,
};

fn fixture(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests/fixtures")
    .join(name)
}

fn pipeline() -> Pipeline {
  Pipeline::load(fixture("tiny_classifier_12.onnx"), LabelSet::garbage()).unwrap()
}

fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
  DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

#[test]
fn load_reports_label_set() {
  let pipeline = pipeline();
  assert_eq!(pipeline.labels().len(), GARBAGE_LABELS.len());
  assert_eq!(pipeline.preprocess(), &Preprocess::default());
}

#[test]
fn classifies_primary_colors() {
  let pipeline = pipeline();
  assert_eq!(pipeline.classify(&solid(224, 224, [255, 0, 0])).unwrap(), "Battery");
  assert_eq!(pipeline.classify(&solid(224, 224, [0, 255, 0])).unwrap(), "Biological");
  assert_eq!(pipeline.classify(&solid(224, 224, [0, 0, 255])).unwrap(), "Brown-Glass");
  assert_eq!(pipeline.classify(&solid(224, 224, [128, 128, 128])).unwrap(), "Metal");
  assert_eq!(pipeline.classify(&solid(224, 224, [255, 255, 255])).unwrap(), "Metal");
}

#[test]
fn every_valid_image_gets_a_known_label() {
  let pipeline = pipeline();
  let images = [
    solid(1, 1, [12, 200, 40]),
    solid(640, 480, [0, 0, 0]),
    solid(3, 1000, [250, 128, 0]),
    DynamicImage::ImageRgb8(RgbImage::from_fn(97, 53, |x, y| {
      Rgb([(x * 2) as u8, (y * 4) as u8, ((x + y) % 256) as u8])
    })),
  ];
  for image in &images {
    let label = pipeline.classify(image).unwrap();
    assert!(pipeline.labels().contains(label), "unexpected label {}", label);
  }
}

#[test]
fn classification_is_deterministic() {
  let pipeline = pipeline();
  let image = DynamicImage::ImageRgb8(RgbImage::from_fn(320, 240, |x, y| {
    Rgb([(x % 256) as u8, (y % 256) as u8, 90])
  }));
  let frame = huishou::RgbFrame::from_dynamic(image.clone()).unwrap();

  let first = pipeline.predict(&frame).unwrap();
  for _ in 0..5 {
    assert_eq!(pipeline.classify(&image).unwrap(), first.label);
    assert_eq!(pipeline.predict(&frame).unwrap(), first);
  }
}

#[test]
fn png_round_trip_keeps_label() {
  let pipeline = pipeline();
  let image = solid(224, 224, [30, 160, 90]);
  let mut encoded = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
    .unwrap();
  let decoded = image::load_from_memory(&encoded).unwrap();

  assert_eq!(
    pipeline.classify(&image).unwrap(),
    pipeline.classify(&decoded).unwrap()
  );
}

#[test]
fn grayscale_matches_equivalent_rgb() {
  let pipeline = pipeline();
  let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(224, 224, Luma([128])));
  let gray_alpha = DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(64, 64, LumaA([128, 10])));
  let rgb = solid(224, 224, [128, 128, 128]);

  let expected = pipeline.classify(&rgb).unwrap();
  assert_eq!(expected, "Metal");
  assert_eq!(pipeline.classify(&gray).unwrap(), expected);
  assert_eq!(pipeline.classify(&gray_alpha).unwrap(), expected);
}

#[test]
fn alpha_channel_is_ignored() {
  let pipeline = pipeline();
  let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(224, 224, Rgba([255, 0, 0, 0])));
  assert_eq!(pipeline.classify(&rgba).unwrap(), "Battery");
}

#[test]
fn empty_image_is_invalid() {
  let pipeline = pipeline();
  for (w, h) in [(0, 0), (0, 10), (10, 0)] {
    let result = pipeline.classify(&DynamicImage::ImageRgb8(RgbImage::new(w, h)));
    assert!(matches!(result, Err(ClassifyError::InvalidImage(_))));
  }
}

#[test]
fn scores_cover_every_label() {
  let pipeline = pipeline();
  let frame = huishou::RgbFrame::from_dynamic(solid(50, 50, [0, 0, 255])).unwrap();
  let prediction = pipeline.predict(&frame).unwrap();
  assert_eq!(prediction.scores.len(), GARBAGE_LABELS.len());
  assert_eq!(prediction.index, 2);
  assert_eq!(prediction.top_k(1)[0].0, 2);
  assert!(prediction.confidence() > 1.0 / GARBAGE_LABELS.len() as f32);
}

#[test]
fn letterbox_mode_still_classifies() {
  let pipeline = PipelineBuilder::new(fixture("tiny_classifier_12.onnx"))
    .preprocess(Preprocess::default().with_resize(ResizeMode::Letterbox))
    .build()
    .unwrap();
  assert_eq!(pipeline.classify(&solid(400, 100, [255, 255, 255])).unwrap(), "Metal");
}

#[test]
fn label_count_mismatch_fails_at_load() {
  let err = Pipeline::load(fixture("tiny_classifier_5.onnx"), LabelSet::garbage()).unwrap_err();
  assert!(matches!(
    err,
    ModelLoadError::LabelCountMismatch {
      expected: 12,
      actual: 5
    }
  ));

  let five = LabelSet::new(["Glass", "Metal", "Paper", "Plastic", "Trash"]).unwrap();
  assert!(Pipeline::load(fixture("tiny_classifier_5.onnx"), five.clone()).is_ok());
  assert!(matches!(
    Pipeline::load(fixture("tiny_classifier_12.onnx"), five),
    Err(ModelLoadError::LabelCountMismatch { .. })
  ));
}

#[test]
fn labels_file_from_repository_loads() {
  let labels = LabelSet::from_path(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("labels/garbage.toml"))
    .unwrap();
  assert_eq!(labels, LabelSet::garbage());
}

#[test]
fn training_label_names_load_in_model_order() {
  let labels = LabelSet::from_path(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("labels/garbage_tr.toml"))
    .unwrap();
  assert_eq!(labels.len(), GARBAGE_LABELS.len());
  assert_eq!(labels.index_of("Metal"), Some(6));
  assert_eq!(labels.get(10), Some("Çöp"));

  let pipeline = Pipeline::load(fixture("tiny_classifier_12.onnx"), labels).unwrap();
  assert_eq!(pipeline.classify(&solid(64, 64, [255, 0, 0])).unwrap(), "Batarya");
  assert_eq!(pipeline.classify(&solid(64, 64, [128, 128, 128])).unwrap(), "Metal");
}

/// 需要训练好的模型与金属罐照片：
/// `HUISHOU_MODEL=garbage_resnet18.onnx HUISHOU_METAL_IMAGE=can.jpg cargo test -- --ignored`
#[test]
#[ignore]
fn trained_model_recognises_metal_can() {
  let (Ok(model), Ok(photo)) = (
    std::env::var("HUISHOU_MODEL"),
    std::env::var("HUISHOU_METAL_IMAGE"),
  ) else {
    eprintln!("HUISHOU_MODEL / HUISHOU_METAL_IMAGE 未设置，跳过");
    return;
  };
  let pipeline = Pipeline::load(model, LabelSet::garbage()).unwrap();
  let image = image::open(photo).unwrap();
  assert_eq!(pipeline.classify(&image).unwrap(), "Metal");
}
