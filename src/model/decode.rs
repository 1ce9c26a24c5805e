// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/model/decode.rs - 检测输出解码
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

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
  letterbox::LetterboxResult,
  model::{Detection, LabelSet, OutputTensor, Rect},
};

const BOX_ROWS: usize = 4;

pub const DEFAULT_NUM_CLASSES: usize = 4;
pub const DEFAULT_NUM_ANCHORS: usize = 8400;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_CANVAS_MIN_EXTENT: f32 = 5.0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
  #[error("输出张量形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    expected: [usize; 3],
    actual: Vec<usize>,
  },
}

/// 输出张量中框几何 (cx, cy, w, h) 的坐标约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CoordConvention {
  /// 相对原图的归一化坐标，直接乘以原图宽高，不做 letterbox 逆变换
  NormalizedToSource,
  /// 画布像素坐标，去除填充并除以缩放比例映射回原图
  #[default]
  CanvasPixelsToCanvas,
}

impl CoordConvention {
  pub fn default_min_extent(self) -> f32 {
    match self {
      CoordConvention::NormalizedToSource => 0.0,
      CoordConvention::CanvasPixelsToCanvas => DEFAULT_CANVAS_MIN_EXTENT,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeConfig {
  /// 最高类别得分必须严格大于该阈值
  pub confidence_threshold: f32,
  pub convention: CoordConvention,
  /// 原图像素下框的最小宽高
  pub min_extent: f32,
  pub num_classes: usize,
  pub num_anchors: usize,
}

impl Default for DecodeConfig {
  fn default() -> Self {
    let convention = CoordConvention::default();
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      convention,
      min_extent: convention.default_min_extent(),
      num_classes: DEFAULT_NUM_CLASSES,
      num_anchors: DEFAULT_NUM_ANCHORS,
    }
  }
}

impl DecodeConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  /// 同时把最小尺寸重置为该约定的默认值
  pub fn with_convention(mut self, convention: CoordConvention) -> Self {
    self.convention = convention;
    self.min_extent = convention.default_min_extent();
    self
  }

  pub fn with_min_extent(mut self, min_extent: f32) -> Self {
    self.min_extent = min_extent;
    self
  }

  pub fn with_shape(mut self, num_classes: usize, num_anchors: usize) -> Self {
    self.num_classes = num_classes;
    self.num_anchors = num_anchors;
    self
  }

  pub fn expected_shape(&self) -> [usize; 3] {
    [1, BOX_ROWS + self.num_classes, self.num_anchors]
  }
}

/// 解码模型输出为原图坐标下的检测结果
///
/// 每个得分超过阈值的锚点都独立成为一个检测结果，不做非极大值抑制，
/// 同一物体上的重叠框会原样保留；结果按锚点下标排序。
/// 几何异常（非有限值、退化框、过小的框）的锚点直接跳过，
/// 只有张量形状与配置不一致时才返回错误。
pub fn decode(
  output: &OutputTensor,
  transform: &LetterboxResult,
  labels: &LabelSet,
  source_width: u32,
  source_height: u32,
  config: &DecodeConfig,
) -> Result<Vec<Detection>, DecodeError> {
  let expected = config.expected_shape();
  if output.shape() != expected.as_slice() {
    return Err(DecodeError::ShapeMismatch {
      expected,
      actual: output.shape().to_vec(),
    });
  }

  if labels.len() != config.num_classes {
    debug!(
      "标签数量 {} 与类别数量 {} 不一致，缺失的标签使用 \"Class <i>\"",
      labels.len(),
      config.num_classes
    );
  }

  let rows = (0..BOX_ROWS + config.num_classes)
    .map(|r| output.row(r))
    .collect::<Option<Vec<_>>>()
    .ok_or_else(|| DecodeError::ShapeMismatch {
      expected,
      actual: output.shape().to_vec(),
    })?;
  let (geometry, scores) = rows.split_at(BOX_ROWS);

  let source = (source_width as f32, source_height as f32);
  let mut detections = Vec::new();

  for anchor in 0..config.num_anchors {
    let Some((class_index, score)) = best_class(scores, anchor) else {
      continue;
    };

    if score <= config.confidence_threshold {
      continue;
    }

    let (cx, cy, w, h) = (
      geometry[0][anchor],
      geometry[1][anchor],
      geometry[2][anchor],
      geometry[3][anchor],
    );

    let Some(bbox) = reconstruct(cx, cy, w, h, transform, source, config) else {
      trace!("锚点 {} 的框无效，跳过: ({}, {}, {}, {})", anchor, cx, cy, w, h);
      continue;
    };

    detections.push(Detection {
      bbox,
      class_index,
      label: labels.label(class_index).into_owned(),
      score,
    });
  }

  debug!("解码得到 {} 个检测结果", detections.len());
  Ok(detections)
}

// 稳定的 arg-max：严格大于才替换，并列时保留第一个，NaN 不参与比较
fn best_class(scores: &[&[f32]], anchor: usize) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (class_index, row) in scores.iter().enumerate() {
    let score = row[anchor];
    if score.is_nan() {
      continue;
    }
    match best {
      Some((_, best_score)) if score <= best_score => {}
      _ => best = Some((class_index, score)),
    }
  }
  best
}

fn reconstruct(
  cx: f32,
  cy: f32,
  w: f32,
  h: f32,
  transform: &LetterboxResult,
  (source_width, source_height): (f32, f32),
  config: &DecodeConfig,
) -> Option<Rect> {
  let (left, top, right, bottom) = match config.convention {
    CoordConvention::NormalizedToSource => (
      (cx - w / 2.0) * source_width,
      (cy - h / 2.0) * source_height,
      (cx + w / 2.0) * source_width,
      (cy + h / 2.0) * source_height,
    ),
    CoordConvention::CanvasPixelsToCanvas => {
      let pad_x = transform.pad_x as f32;
      let pad_y = transform.pad_y as f32;
      let scale = transform.scale;
      (
        (cx - w / 2.0 - pad_x) / scale,
        (cy - h / 2.0 - pad_y) / scale,
        (cx + w / 2.0 - pad_x) / scale,
        (cy + h / 2.0 - pad_y) / scale,
      )
    }
  };

  if ![left, top, right, bottom].iter().all(|v| v.is_finite()) {
    return None;
  }

  let bbox = match config.convention {
    // 归一化坐标不做裁剪，越出原图的框整个丢弃
    CoordConvention::NormalizedToSource => {
      if left < 0.0 || top < 0.0 || right > source_width || bottom > source_height {
        return None;
      }
      Rect {
        left,
        top,
        right,
        bottom,
      }
    }
    CoordConvention::CanvasPixelsToCanvas => Rect {
      left: left.clamp(0.0, source_width),
      top: top.clamp(0.0, source_height),
      right: right.clamp(0.0, source_width),
      bottom: bottom.clamp(0.0, source_height),
    },
  };

  let (width, height) = (bbox.width(), bbox.height());
  if width <= 0.0 || height <= 0.0 || width < config.min_extent || height < config.min_extent {
    return None;
  }

  Some(bbox)
}
