// 该文件是 Huishou （回收分类） 项目的一部分。
// src/model.rs - 模型
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

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<T: Model + ?Sized> Model for &T {
  type Input = T::Input;
  type Output = T::Output;
  type Error = T::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

/// 单次分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  pub index: usize,
  pub label: String,
  /// 模型原始输出得分（logits）
  pub scores: Box<[f32]>,
}

impl Prediction {
  /// 所选类别的 softmax 概率
  pub fn confidence(&self) -> f32 {
    softmax(&self.scores)
      .get(self.index)
      .copied()
      .unwrap_or(0.0)
  }

  /// 得分最高的前 k 个类别索引及其概率，按概率降序
  pub fn top_k(&self, k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = softmax(&self.scores).into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
  }
}

/// 最大值所在索引；相同得分取最小索引，NaN 不参与比较
pub fn argmax(scores: &[f32]) -> Option<usize> {
  let mut best: Option<(usize, f32)> = None;
  for (index, &score) in scores.iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    match best {
      Some((_, best_score)) if score <= best_score => {}
      _ => best = Some((index, score)),
    }
  }
  best.map(|(index, _)| index)
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
  let max = scores
    .iter()
    .copied()
    .filter(|s| !s.is_nan())
    .fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = scores
    .iter()
    .map(|&s| if s.is_nan() { 0.0 } else { (s - max).exp() })
    .collect();
  let sum: f32 = exps.iter().sum();
  if sum == 0.0 || !sum.is_finite() {
    return vec![0.0; scores.len()];
  }
  exps.into_iter().map(|e| e / sum).collect()
}

mod classifier;
pub mod labels;
mod preprocess;

pub use self::classifier::{ClassifyError, ModelLoadError, Pipeline, PipelineBuilder};
pub use self::labels::{GARBAGE_LABELS, LabelSet, LabelSetError};
pub use self::preprocess::{
  DEFAULT_INPUT_SIZE, IMAGENET_MEAN, IMAGENET_STD, Preprocess, ResizeMode,
};
