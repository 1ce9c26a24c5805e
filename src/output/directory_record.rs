// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Datelike, Utc};
use image::RgbImage;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{Render, draw::Draw},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每帧的落盘方式
pub enum RecordMode {
  /// 保存画好检测框的图像
  Draw(Draw),
  /// 保存原图，另写一份同名 JSON 记录检测结果
  Record,
}

impl RecordMode {
  fn with(kind: &str) -> Self {
    match kind {
      "json" | "record" => RecordMode::Record,
      _ => RecordMode::Draw(Draw::default()),
    }
  }

  fn save_result(
    &self,
    path: &Path,
    frame: &RgbImage,
    result: &DetectResult,
    timestamp: &DateTime<Utc>,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      RecordMode::Draw(draw) => {
        let mut image = frame.clone();
        draw.draw_detections_on_image(&mut image, result);
        image.save(path)?;
      }
      RecordMode::Record => {
        frame.save(path)?;
        let report = detection_report(frame, result, timestamp);
        std::fs::write(path.with_extension("json"), serde_json::to_vec_pretty(&report)?)?;
      }
    }
    Ok(())
  }
}

fn detection_report(
  frame: &RgbImage,
  result: &DetectResult,
  timestamp: &DateTime<Utc>,
) -> serde_json::Value {
  let detections: Vec<_> = result
    .items
    .iter()
    .map(|d| {
      json!({
        "label": d.label,
        "class_index": d.class_index,
        "score": d.score,
        "box": {
          "left": d.bbox.left,
          "top": d.bbox.top,
          "right": d.bbox.right,
          "bottom": d.bbox.bottom,
        },
      })
    })
    .collect();

  json!({
    "width": frame.width(),
    "height": frame.height(),
    "timestamp": timestamp.to_rfc3339(),
    "detections": detections,
  })
}

/// 按 年/月/日 分目录保存每一帧。
///
/// URL 形如 `folder:///data/records?record=json&always`：
/// `record=json` 保存原图与 JSON 报告，缺省则保存标注后的图像；
/// `always` 表示没有检测结果的帧也保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  mode: RecordMode,
  frame_counter: AtomicU32,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| "draw".to_string());
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      mode: RecordMode::with(&kind),
      frame_counter: AtomicU32::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    let id = self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    id as u16
  }

  fn frame_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbImage, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }
    let now = Utc::now();
    let path = self.frame_path(&now)?;
    self.mode.save_result(&path, frame, result, &now)?;
    debug!("帧已保存到 {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Detection, Rect};

  fn collect_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        found.extend(collect_files(&path, extension));
      } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
        found.push(path);
      }
    }
    found.sort();
    found
  }

  fn one_detection() -> DetectResult {
    DetectResult::from(vec![Detection {
      bbox: Rect {
        left: 1.0,
        top: 2.0,
        right: 9.0,
        bottom: 8.0,
      },
      class_index: 2,
      label: "Dead Rhizophora".to_string(),
      score: 0.75,
    }])
  }

  #[test]
  fn json_mode_writes_image_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?record=json", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output
      .render_result(&RgbImage::new(12, 10), &one_detection())
      .unwrap();

    let images = collect_files(dir.path(), "png");
    let reports = collect_files(dir.path(), "json");
    assert_eq!(images.len(), 1);
    assert_eq!(reports.len(), 1);
    assert!(images[0].to_string_lossy().ends_with("-0001.png"));

    let report: serde_json::Value =
      serde_json::from_slice(&std::fs::read(&reports[0]).unwrap()).unwrap();
    assert_eq!(report["width"], 12);
    assert_eq!(report["height"], 10);
    assert_eq!(report["detections"][0]["label"], "Dead Rhizophora");
    assert_eq!(report["detections"][0]["class_index"], 2);
    assert_eq!(report["detections"][0]["box"]["right"], 9.0);
  }

  #[test]
  fn empty_results_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output
      .render_result(&RgbImage::new(4, 4), &DetectResult::default())
      .unwrap();
    assert!(collect_files(dir.path(), "png").is_empty());

    let url = url::Url::parse(&format!("folder://{}?always", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output
      .render_result(&RgbImage::new(4, 4), &DetectResult::default())
      .unwrap();
    output
      .render_result(&RgbImage::new(4, 4), &DetectResult::default())
      .unwrap();
    assert_eq!(collect_files(dir.path(), "png").len(), 2);
    assert!(collect_files(dir.path(), "json").is_empty());
  }

  #[test]
  fn rejects_other_schemes() {
    let url = url::Url::parse("image:///tmp/out.png").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }
}
