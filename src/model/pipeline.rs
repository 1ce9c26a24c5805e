// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/model/pipeline.rs - 检测流水线
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  config::PipelineConfig,
  frame::InputTensor,
  letterbox::{LetterboxError, letterbox},
  model::{DecodeError, DetectResult, Inference, LabelSet, Model, OutputTensor, decode},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("输入无效: {0}")]
  InvalidInput(#[from] LetterboxError),
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("推理能力不可用")]
  ModelUnavailable,
  #[error("推理错误: {0}")]
  Inference(Box<dyn std::error::Error + Send + Sync>),
}

/// letterbox → 编码 → 推理 → 解码
///
/// 构造一次后只读使用，`detect` 不修改任何内部状态，可在多个线程上并发调用。
/// 没有推理能力时（模型加载失败）每帧都返回空结果。
pub struct DetectionPipeline<E> {
  labels: LabelSet,
  inference: Option<E>,
  config: PipelineConfig,
}

impl<E: Inference> DetectionPipeline<E> {
  pub fn new(labels: LabelSet, inference: Option<E>, config: PipelineConfig) -> Self {
    if inference.is_none() {
      warn!("未提供推理能力，检测结果将始终为空");
    }
    Self {
      labels,
      inference,
      config,
    }
  }

  pub fn labels(&self) -> &LabelSet {
    &self.labels
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn is_available(&self) -> bool {
    self.inference.is_some()
  }

  pub fn run_inference(&self, input: &InputTensor) -> Result<OutputTensor, PipelineError> {
    let inference = self
      .inference
      .as_ref()
      .ok_or(PipelineError::ModelUnavailable)?;
    inference
      .infer(input)
      .map_err(|e| PipelineError::Inference(Box::new(e)))
  }

  pub fn detect(&self, image: &RgbImage) -> Result<DetectResult, PipelineError> {
    let (source_width, source_height) = image.dimensions();
    let transform = letterbox(image, self.config.input_size)?;
    let input = InputTensor::encode(&transform.canvas, self.config.layout);

    let output = match self.run_inference(&input) {
      Ok(output) => output,
      Err(PipelineError::ModelUnavailable) => {
        debug!("推理能力不可用，返回空结果");
        return Ok(DetectResult::default());
      }
      Err(e) => return Err(e),
    };

    let items = decode(
      &output,
      &transform,
      &self.labels,
      source_width,
      source_height,
      &self.config.decode,
    )?;
    Ok(items.into())
  }
}

impl<E: Inference> Model for DetectionPipeline<E> {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = PipelineError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.detect(input)
  }
}
