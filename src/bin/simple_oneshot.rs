// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像检测
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

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use url::Url;

use bakhaw::{
  FromUrl,
  config::PipelineArgs,
  input::InputWrapper,
  model::{DetectionPipeline, LabelSet, ReplayModelBuilder},
  output::OutputWrapper,
  task::{OneShotTask, Task},
};

/// Bakhaw 单张图像检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 replay:///path/output.bin?classes=4&anchors=8400
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let labels = LabelSet::load_or_default(&args.pipeline.labels);
  let inference = match ReplayModelBuilder::from_url(&args.model)
    .and_then(|b| b.shape(args.pipeline.classes, args.pipeline.anchors).build())
  {
    Ok(model) => Some(model),
    Err(e) => {
      error!("模型加载失败，检测功能不可用: {}", e);
      None
    }
  };
  let pipeline = DetectionPipeline::new(labels, inference, args.pipeline.to_config());

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input, pipeline, output)?;

  Ok(())
}
