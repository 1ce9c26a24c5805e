// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/model/replay.rs - 回放录制的模型输出
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

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::InputTensor,
  model::{
    Inference, OutputTensor,
    decode::{DEFAULT_NUM_ANCHORS, DEFAULT_NUM_CLASSES},
  },
};

const F32_BYTES: usize = std::mem::size_of::<f32>();

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
  #[error("张量大小不匹配: 期望 {expected} 个浮点数, 实际 {actual} 字节")]
  SizeMismatch { expected: usize, actual: usize },
}

/// 把预先录制的 [1, 4 + C, A] 输出张量（小端 f32）当作推理结果返回
///
/// 用于离线复现某一帧的解码结果，与真实的推理引擎共享同一接口。
#[derive(Debug, Clone)]
pub struct ReplayModel {
  output: OutputTensor,
}

impl ReplayModel {
  pub fn new(output: OutputTensor) -> Self {
    Self { output }
  }
}

impl Inference for ReplayModel {
  type Error = std::convert::Infallible;

  fn infer(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error> {
    debug!("回放输出张量, 输入形状: {:?}", input.shape());
    Ok(self.output.clone())
  }
}

#[derive(Debug, Clone)]
pub struct ReplayModelBuilder {
  tensor_path: String,
  num_classes: usize,
  num_anchors: usize,
}

impl FromUrlWithScheme for ReplayModelBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModelBuilder {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayModelError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let query_pairs: HashMap<_, _> = url.query_pairs().collect();
    let parse = |key: &str, default: usize| -> Result<usize, ReplayModelError> {
      match query_pairs.get(key) {
        Some(value) => value
          .parse()
          .map_err(|_| ReplayModelError::InvalidParameter(format!("{}={}", key, value))),
        None => Ok(default),
      }
    };

    Ok(ReplayModelBuilder {
      tensor_path: url.path().to_string(),
      num_classes: parse("classes", DEFAULT_NUM_CLASSES)?,
      num_anchors: parse("anchors", DEFAULT_NUM_ANCHORS)?,
    })
  }
}

impl ReplayModelBuilder {
  /// 覆盖 URL 查询参数中的类别数与锚点数
  pub fn shape(mut self, num_classes: usize, num_anchors: usize) -> Self {
    self.num_classes = num_classes;
    self.num_anchors = num_anchors;
    self
  }

  pub fn build(self) -> Result<ReplayModel, ReplayModelError> {
    info!("加载输出张量文件: {}", self.tensor_path);
    let bytes = std::fs::read(&self.tensor_path)?;
    debug!(
      "输出张量文件大小: {:.2} MB",
      bytes.len() as f64 / (1024.0 * 1024.0)
    );

    let rows = 4 + self.num_classes;
    let expected = rows * self.num_anchors;
    if bytes.len() != expected * F32_BYTES {
      return Err(ReplayModelError::SizeMismatch {
        expected,
        actual: bytes.len(),
      });
    }

    let data = bytes
      .chunks_exact(F32_BYTES)
      .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect();

    let output = OutputTensor::new(vec![1, rows, self.num_anchors], data).ok_or(
      ReplayModelError::SizeMismatch {
        expected,
        actual: bytes.len(),
      },
    )?;

    Ok(ReplayModel::new(output))
  }
}
