// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/letterbox.rs - 等比缩放并填充到正方形画布
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

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LetterboxError {
  #[error("输入图像尺寸无效: {width}x{height}")]
  InvalidInput { width: u32, height: u32 },
  #[error("目标画布尺寸无效: {0}")]
  InvalidTargetSize(u32),
}

/// Letterbox 变换结果
///
/// 画布之外还保存了缩放比例与填充偏移，解码阶段需要依赖它们把
/// 画布坐标映射回原图坐标，因此必须在推理调用期间保留。
#[derive(Debug, Clone)]
pub struct LetterboxResult {
  /// S×S 画布，空白处为黑色
  pub canvas: RgbImage,
  /// min(S / 原图宽, S / 原图高)
  pub scale: f32,
  /// 水平填充（左侧）
  pub pad_x: u32,
  /// 垂直填充（上侧）
  pub pad_y: u32,
  /// 缩放后（未填充）图像的宽度
  pub resized_width: u32,
  /// 缩放后（未填充）图像的高度
  pub resized_height: u32,
}

impl LetterboxResult {
  pub fn target_size(&self) -> u32 {
    self.canvas.width()
  }

  pub fn resized_dimensions(&self) -> (u32, u32) {
    (self.resized_width, self.resized_height)
  }
}

/// 等比缩放 `image` 并居中放置到 `target_size`×`target_size` 的黑色画布上
pub fn letterbox(image: &RgbImage, target_size: u32) -> Result<LetterboxResult, LetterboxError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(LetterboxError::InvalidInput { width, height });
  }
  if target_size == 0 {
    return Err(LetterboxError::InvalidTargetSize(target_size));
  }

  let target = target_size as f32;
  let scale = (target / width as f32).min(target / height as f32);
  let new_w = scaled_extent(width, scale, target_size);
  let new_h = scaled_extent(height, scale, target_size);

  debug!(
    "letterbox: {}x{} -> {}x{} (scale={:.4}, 画布={})",
    width, height, new_w, new_h, scale, target_size
  );

  let resized = if (new_w, new_h) == (width, height) {
    image.clone()
  } else {
    image::imageops::resize(image, new_w, new_h, FilterType::Triangle)
  };

  let pad_x = (target_size - new_w) / 2;
  let pad_y = (target_size - new_h) / 2;

  let mut canvas = RgbImage::new(target_size, target_size);
  image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

  Ok(LetterboxResult {
    canvas,
    scale,
    pad_x,
    pad_y,
    resized_width: new_w,
    resized_height: new_h,
  })
}

// round(extent * scale)，限制在 [1, target] 之内
fn scaled_extent(extent: u32, scale: f32, target: u32) -> u32 {
  let scaled = (extent as f32 * scale).round() as u32;
  scaled.clamp(1, target)
}
