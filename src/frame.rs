// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/frame.rs - 模型输入张量定义与编码
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

const RGB_CHANNELS: usize = 3;

/// 输入张量的内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TensorLayout {
  /// [1, H, W, 3]，通道在最后
  #[default]
  Nhwc,
  /// [1, 3, H, W]，通道在最前
  Nchw,
}

/// 归一化到 [0, 1] 的 RGB 浮点输入张量
#[derive(Debug, Clone)]
pub struct InputTensor {
  layout: TensorLayout,
  height: usize,
  width: usize,
  data: Box<[f32]>,
}

impl InputTensor {
  /// 将画布编码为输入张量，像素值除以 255，不做均值/方差归一化
  pub fn encode(canvas: &RgbImage, layout: TensorLayout) -> Self {
    let (width, height) = {
      let (w, h) = canvas.dimensions();
      (w as usize, h as usize)
    };
    let plane = width * height;
    let mut data = vec![0.0f32; RGB_CHANNELS * plane].into_boxed_slice();

    match layout {
      TensorLayout::Nhwc => {
        // RgbImage 的原始缓冲区本身就是行优先的 HWC
        for (dst, &src) in data.iter_mut().zip(canvas.as_raw().iter()) {
          *dst = src as f32 / 255.0;
        }
      }
      TensorLayout::Nchw => {
        for (idx, pixel) in canvas.as_raw().chunks_exact(RGB_CHANNELS).enumerate() {
          data[idx] = pixel[0] as f32 / 255.0;
          data[plane + idx] = pixel[1] as f32 / 255.0;
          data[2 * plane + idx] = pixel[2] as f32 / 255.0;
        }
      }
    }

    Self {
      layout,
      height,
      width,
      data,
    }
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    match self.layout {
      TensorLayout::Nhwc => [1, self.height, self.width, RGB_CHANNELS],
      TensorLayout::Nchw => [1, RGB_CHANNELS, self.height, self.width],
    }
  }

  /// 读取 (x, y) 处第 c 个通道的值
  pub fn get(&self, x: usize, y: usize, c: usize) -> Option<f32> {
    if x >= self.width || y >= self.height || c >= RGB_CHANNELS {
      return None;
    }
    let index = match self.layout {
      TensorLayout::Nhwc => (y * self.width + x) * RGB_CHANNELS + c,
      TensorLayout::Nchw => c * self.height * self.width + y * self.width + x,
    };
    self.data.get(index).copied()
  }
}

impl AsRef<[f32]> for InputTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}
