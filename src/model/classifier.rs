// 该文件是 Huishou （回收分类） 项目的一部分。
// src/model/classifier.rs - 分类推理管线
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

use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, error, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{InvalidImageError, RgbFrame},
  model::{LabelSet, Model, Prediction, Preprocess, ResizeMode, argmax, labels::LabelSetError},
  url_path, url_query,
};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型文件读取错误 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("模型无效 {path}: {reason}")]
  Invalid { path: PathBuf, reason: String },
  #[error("模型输出形状 {shape} 不是分类器输出 [1, N]")]
  OutputShape { shape: String },
  #[error("模型输出宽度 {actual} 与标签数量 {expected} 不一致")]
  LabelCountMismatch { expected: usize, actual: usize },
  #[error("标签错误: {0}")]
  Labels(#[from] LabelSetError),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl ModelLoadError {
  fn invalid(path: &Path, e: TractError) -> Self {
    ModelLoadError::Invalid {
      path: path.to_path_buf(),
      reason: format!("{:#}", e),
    }
  }
}

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("输入图像无效: {0}")]
  InvalidImage(#[from] InvalidImageError),
  #[error("推理错误: {0}")]
  Inference(String),
}

impl From<TractError> for ClassifyError {
  fn from(err: TractError) -> Self {
    ClassifyError::Inference(format!("{:#}", err))
  }
}

/// 已加载的分类管线：模型、标签与预处理参数在构造后不再改变
pub struct Pipeline {
  plan: Plan,
  labels: LabelSet,
  preprocess: Preprocess,
}

impl std::fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("labels", &self.labels)
      .field("preprocess", &self.preprocess)
      .finish_non_exhaustive()
  }
}

pub struct PipelineBuilder {
  model_path: PathBuf,
  labels: Option<LabelSet>,
  labels_path: Option<PathBuf>,
  preprocess: Preprocess,
}

const ONNX_SCHEME: &str = "onnx";

impl FromUrlWithScheme for PipelineBuilder {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl FromUrl for PipelineBuilder {
  type Error = ModelLoadError;

  /// `onnx:///path/model.onnx?labels=/path/labels.toml&resize=letterbox`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = PipelineBuilder::new(url_path(url));
    if let Some(labels) = url_query(url, "labels") {
      builder.labels_path = Some(PathBuf::from(labels));
    }
    if let Some(resize) = url_query(url, "resize") {
      let mode = resize
        .parse::<ResizeMode>()
        .map_err(ModelLoadError::ModelPathError)?;
      builder.preprocess = builder.preprocess.with_resize(mode);
    }
    Ok(builder)
  }
}

impl PipelineBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      labels: None,
      labels_path: None,
      preprocess: Preprocess::default(),
    }
  }

  pub fn labels(mut self, labels: LabelSet) -> Self {
    self.labels = Some(labels);
    self.labels_path = None;
    self
  }

  pub fn labels_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.labels_path = Some(path.into());
    self.labels = None;
    self
  }

  pub fn preprocess(mut self, preprocess: Preprocess) -> Self {
    self.preprocess = preprocess;
    self
  }

  pub fn build(self) -> Result<Pipeline, ModelLoadError> {
    let labels = match (self.labels, self.labels_path) {
      (Some(labels), _) => labels,
      (None, Some(path)) => LabelSet::from_path(&path)?,
      (None, None) => LabelSet::garbage(),
    };
    let path = self.model_path.as_path();
    let preprocess = self.preprocess;

    info!("加载模型文件: {}", path.display());
    let metadata = std::fs::metadata(path).map_err(|source| ModelLoadError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    let input_fact = f32::fact([
      1usize,
      3,
      preprocess.height as usize,
      preprocess.width as usize,
    ]);
    let model = tract_onnx::onnx()
      .model_for_path(path)
      .and_then(|model| model.with_input_fact(0, input_fact.into()))
      .and_then(|model| model.into_optimized())
      .map_err(|e| ModelLoadError::invalid(path, e))?;

    let static_width = classifier_width(&model)?;
    let plan = model
      .into_runnable()
      .map_err(|e| ModelLoadError::invalid(path, e))?;

    let pipeline = Pipeline {
      plan,
      labels,
      preprocess,
    };

    // 符号维度的模型需要实际跑一次才能得知输出宽度
    let width = match static_width {
      Some(width) => width,
      None => {
        debug!("输出形状含符号维度，执行一次空白推理以确定宽度");
        let blank = tract_ndarray::Array4::<f32>::zeros((
          1,
          3,
          pipeline.preprocess.height as usize,
          pipeline.preprocess.width as usize,
        ));
        pipeline
          .forward(Tensor::from(blank))
          .map_err(|e| ModelLoadError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
          })?
          .len()
      }
    };

    if width != pipeline.labels.len() {
      error!(
        "预期模型输出宽度为 {}, 实际为 {}",
        pipeline.labels.len(),
        width
      );
      return Err(ModelLoadError::LabelCountMismatch {
        expected: pipeline.labels.len(),
        actual: width,
      });
    }

    info!("模型加载完成，共 {} 个类别", width);
    Ok(pipeline)
  }
}

// 静态可知时返回输出宽度；形状不是 [N] 或 [1, N] 时报错
fn classifier_width(model: &TypedModel) -> Result<Option<usize>, ModelLoadError> {
  let fact = model
    .output_fact(0)
    .map_err(|e| ModelLoadError::OutputShape {
      shape: format!("{:#}", e),
    })?;

  let Some(shape) = fact.shape.as_concrete() else {
    return Ok(None);
  };
  debug!("模型输出形状: {:?}", shape);

  match shape {
    [width] => Ok(Some(*width)),
    [1, width] => Ok(Some(*width)),
    other => Err(ModelLoadError::OutputShape {
      shape: format!("{:?}", other),
    }),
  }
}

impl Pipeline {
  /// 按默认预处理参数加载模型
  pub fn load(model_path: impl AsRef<Path>, labels: LabelSet) -> Result<Self, ModelLoadError> {
    PipelineBuilder::new(model_path.as_ref())
      .labels(labels)
      .build()
  }

  pub fn labels(&self) -> &LabelSet {
    &self.labels
  }

  pub fn preprocess(&self) -> &Preprocess {
    &self.preprocess
  }

  /// 分类一张图像，返回类别名称
  pub fn classify(&self, image: &DynamicImage) -> Result<&str, ClassifyError> {
    let frame = RgbFrame::from_dynamic(image.clone())?;
    let (index, _) = self.scores(&frame)?;
    self.label_at(index)
  }

  /// 分类一帧图像，返回包含全部得分的预测结果
  pub fn predict(&self, frame: &RgbFrame) -> Result<Prediction, ClassifyError> {
    let (index, scores) = self.scores(frame)?;
    let label = self.label_at(index)?.to_string();
    Ok(Prediction {
      index,
      label,
      scores: scores.into_boxed_slice(),
    })
  }

  fn label_at(&self, index: usize) -> Result<&str, ClassifyError> {
    self.labels.get(index).ok_or_else(|| {
      ClassifyError::Inference(format!(
        "类别索引 {} 超出标签范围 {}",
        index,
        self.labels.len()
      ))
    })
  }

  fn scores(&self, frame: &RgbFrame) -> Result<(usize, Vec<f32>), ClassifyError> {
    if frame.width() == 0 || frame.height() == 0 {
      return Err(InvalidImageError::EmptyImage {
        width: frame.width(),
        height: frame.height(),
      }
      .into());
    }

    let input = self.preprocess.to_tensor(frame.as_rgb_image());
    let scores = self.forward(Tensor::from(input))?;
    let index = argmax(&scores)
      .ok_or_else(|| ClassifyError::Inference("模型输出全部为 NaN".to_string()))?;
    debug!("类别索引 {}，得分 {:.4}", index, scores[index]);
    Ok((index, scores))
  }

  fn forward(&self, input: Tensor) -> Result<Vec<f32>, ClassifyError> {
    let outputs = self.plan.run(tvec!(input.into_tvalue()))?;
    let output = outputs
      .first()
      .ok_or_else(|| ClassifyError::Inference("模型没有输出".to_string()))?;
    let output = output.cast_to::<f32>()?;
    Ok(output.as_slice::<f32>()?.to_vec())
  }
}

impl Model for Pipeline {
  type Input = RgbFrame;
  type Output = Prediction;
  type Error = ClassifyError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.predict(input)
  }
}
