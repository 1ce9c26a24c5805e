// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::model::{DetectResult, Detection};

const BORDER_THICKNESS: i32 = 2;
const FILL_ALPHA: f32 = 30.0 / 255.0;

pub const ALIVE_COLOR: Rgb<u8> = Rgb([0, 255, 0]); // 绿色
pub const DEAD_COLOR: Rgb<u8> = Rgb([255, 0, 0]); // 红色
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 255, 0]); // 黄色

/// 按标签选择颜色：存活为绿色，死亡为红色，其余为黄色
pub fn color_for_label(label: &str) -> Rgb<u8> {
  let label = label.to_ascii_lowercase();
  if label.contains("alive") {
    ALIVE_COLOR
  } else if label.contains("dead") {
    DEAD_COLOR
  } else {
    UNKNOWN_COLOR
  }
}

pub struct Draw {
  border_thickness: i32,
  fill_alpha: f32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      border_thickness: BORDER_THICKNESS,
      fill_alpha: FILL_ALPHA,
    }
  }
}

impl Draw {
  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    for detection in result.items.iter() {
      self.draw_detection(image, detection);
    }
  }

  /// 在原图上画出检测框：半透明填充加实线边框
  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (detection.bbox.left.floor() as i32).clamp(0, w - 1);
    let y_min = (detection.bbox.top.floor() as i32).clamp(0, h - 1);
    let x_max = (detection.bbox.right.ceil() as i32).clamp(0, w - 1);
    let y_max = (detection.bbox.bottom.ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = color_for_label(&detection.label);
    self.blend_fill(image, (x_min, y_min, x_max, y_max), color);

    for thickness in 0..self.border_thickness {
      let width = x_max - x_min - 2 * thickness;
      let height = y_max - y_min - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect =
        Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  fn blend_fill(
    &self,
    image: &mut RgbImage,
    (x_min, y_min, x_max, y_max): (i32, i32, i32, i32),
    color: Rgb<u8>,
  ) {
    let alpha = self.fill_alpha;
    for y in y_min..y_max {
      for x in x_min..x_max {
        let pixel = image.get_pixel_mut(x as u32, y as u32);
        for c in 0..3 {
          let blended = pixel[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha;
          pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
      }
    }
  }
}
