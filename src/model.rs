// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
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
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use crate::frame::InputTensor;

/// 帧级模型：输入一帧，输出结果
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 推理能力（张量进，张量出），推理引擎本身对本库不透明
pub trait Inference {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error>;
}

impl<T: Inference + ?Sized> Inference for Box<T> {
  type Error = T::Error;

  fn infer(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error> {
    (**self).infer(input)
  }
}

/// 形状为 [1, 4 + C, A] 的模型输出张量
///
/// 第 0-3 行为 cx, cy, w, h，第 4 行起每行是一个类别在所有锚点上的得分。
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  shape: Vec<usize>,
  data: Box<[f32]>,
}

impl OutputTensor {
  /// 数据长度必须等于形状各维乘积，否则返回 None
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Option<Self> {
    let expected: usize = shape.iter().product();
    if shape.is_empty() || expected != data.len() {
      return None;
    }
    Some(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  /// 全零张量，形状为 [1, rows, anchors]
  pub fn zeros(rows: usize, anchors: usize) -> Self {
    Self {
      shape: vec![1, rows, anchors],
      data: vec![0.0; rows * anchors].into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  /// 第 `row` 行（跨所有锚点），仅对三维张量有效
  pub fn row(&self, row: usize) -> Option<&[f32]> {
    let [_, rows, anchors] = self.shape[..] else {
      return None;
    };
    if row >= rows {
      return None;
    }
    self.data.get(row * anchors..(row + 1) * anchors)
  }

  /// 写入 (row, anchor) 处的值，主要用于构造合成张量
  pub fn set(&mut self, row: usize, anchor: usize, value: f32) -> bool {
    let [_, rows, anchors] = self.shape[..] else {
      return false;
    };
    if row >= rows || anchor >= anchors {
      return false;
    }
    self.data[row * anchors + anchor] = value;
    true
  }
}

impl AsRef<[f32]> for OutputTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

/// 原图像素坐标下的矩形框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl Rect {
  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: Rect,
  pub class_index: usize,
  pub label: String,
  pub score: f32,
}

impl Detection {
  /// 叠加层上显示的文本，例如 "Dead Trunk (87.5%)"
  pub fn display_label(&self) -> String {
    format!("{} ({:.1}%)", self.label, self.score * 100.0)
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

mod decode;
mod labels;
mod pipeline;
mod replay;

pub use self::decode::{CoordConvention, DecodeConfig, DecodeError, decode};
pub use self::labels::{DEFAULT_LABELS, LabelError, LabelSet};
pub use self::pipeline::{DetectionPipeline, PipelineError};
pub use self::replay::{ReplayModel, ReplayModelBuilder, ReplayModelError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_tensor_rejects_wrong_length() {
    assert!(OutputTensor::new(vec![1, 8, 10], vec![0.0; 79]).is_none());
    assert!(OutputTensor::new(vec![], vec![]).is_none());
    assert!(OutputTensor::new(vec![1, 8, 10], vec![0.0; 80]).is_some());
  }

  #[test]
  fn output_tensor_rows_are_anchor_slices() {
    let mut tensor = OutputTensor::zeros(5, 3);
    assert!(tensor.set(4, 2, 0.75));
    assert!(!tensor.set(5, 0, 1.0));
    assert_eq!(tensor.row(4), Some(&[0.0, 0.0, 0.75][..]));
    assert_eq!(tensor.row(5), None);
  }

  #[test]
  fn display_label_shows_percentage() {
    let detection = Detection {
      bbox: Rect {
        left: 0.0,
        top: 0.0,
        right: 10.0,
        bottom: 10.0,
      },
      class_index: 3,
      label: "Dead Trunk".to_string(),
      score: 0.875,
    };
    assert_eq!(detection.display_label(), "Dead Trunk (87.5%)");
  }
}
