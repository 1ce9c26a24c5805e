// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/config.rs - 流水线配置
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

use std::path::PathBuf;

use clap::Args;

use crate::{
  frame::TensorLayout,
  model::{CoordConvention, DecodeConfig},
};

pub const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
  /// 模型输入画布边长 S
  pub input_size: u32,
  pub layout: TensorLayout,
  pub decode: DecodeConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      layout: TensorLayout::default(),
      decode: DecodeConfig::default(),
    }
  }
}

impl PipelineConfig {
  pub fn with_input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn with_layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn with_decode(mut self, decode: DecodeConfig) -> Self {
    self.decode = decode;
    self
  }
}

/// 各个可执行程序共用的流水线参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 类别标签文件（每行一个类别），缺失时使用默认标签
  #[arg(long, value_name = "FILE", default_value = "labels.txt")]
  pub labels: PathBuf,

  /// 模型输入画布边长
  #[arg(long, value_name = "PIXELS", default_value_t = DEFAULT_INPUT_SIZE)]
  pub input_size: u32,

  /// 输入张量布局
  #[arg(long, value_enum, default_value_t = TensorLayout::Nhwc)]
  pub layout: TensorLayout,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD", default_value_t = 0.5)]
  pub confidence: f32,

  /// 输出框的坐标约定
  #[arg(long, value_enum, default_value_t = CoordConvention::CanvasPixelsToCanvas)]
  pub convention: CoordConvention,

  /// 最小框尺寸（原图像素），默认取决于坐标约定
  #[arg(long, value_name = "PIXELS")]
  pub min_extent: Option<f32>,

  /// 类别数量 C
  #[arg(long, value_name = "COUNT", default_value_t = 4)]
  pub classes: usize,

  /// 锚点数量 A
  #[arg(long, value_name = "COUNT", default_value_t = 8400)]
  pub anchors: usize,
}

impl PipelineArgs {
  pub fn to_config(&self) -> PipelineConfig {
    let mut decode = DecodeConfig::default()
      .with_convention(self.convention)
      .with_confidence_threshold(self.confidence)
      .with_shape(self.classes, self.anchors);
    if let Some(min_extent) = self.min_extent {
      decode = decode.with_min_extent(min_extent);
    }

    PipelineConfig::default()
      .with_input_size(self.input_size)
      .with_layout(self.layout)
      .with_decode(decode)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct TestCli {
    #[command(flatten)]
    pipeline: PipelineArgs,
  }

  #[test]
  fn defaults_match_pipeline_config() {
    let cli = TestCli::parse_from(["test"]);
    assert_eq!(cli.pipeline.to_config(), PipelineConfig::default());
  }

  #[test]
  fn convention_sets_min_extent_unless_overridden() {
    let cli = TestCli::parse_from(["test", "--convention", "normalized-to-source"]);
    let config = cli.pipeline.to_config();
    assert_eq!(config.decode.convention, CoordConvention::NormalizedToSource);
    assert_eq!(config.decode.min_extent, 0.0);

    let cli = TestCli::parse_from([
      "test",
      "--min-extent",
      "12",
      "--confidence",
      "0.25",
      "--classes",
      "80",
      "--layout",
      "nchw",
    ]);
    let config = cli.pipeline.to_config();
    assert_eq!(config.decode.min_extent, 12.0);
    assert_eq!(config.decode.confidence_threshold, 0.25);
    assert_eq!(config.decode.expected_shape(), [1, 84, 8400]);
    assert_eq!(config.layout, TensorLayout::Nchw);
  }
}
