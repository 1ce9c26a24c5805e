// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// tests/pipeline.rs - 端到端检测流程测试
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

use image::{Rgb, RgbImage};
use url::Url;

use bakhaw::{
  FromUrl,
  config::PipelineConfig,
  input::InputWrapper,
  model::{
    CoordConvention, DecodeConfig, DetectionPipeline, LabelSet, ReplayModel, ReplayModelBuilder,
  },
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

const CLASSES: usize = 4;
const ANCHORS: usize = 3;

/// 写出 [1, 8, 3] 的输出张量：锚点 0 为一个 Alive Trunk 框，锚点 1 得分都偏低
fn write_tensor(path: &Path) {
  let mut rows = vec![[0.0f32; ANCHORS]; 4 + CLASSES];
  rows[0][0] = 320.0;
  rows[1][0] = 320.0;
  rows[2][0] = 100.0;
  rows[3][0] = 100.0;
  rows[4 + 1][0] = 0.9;
  rows[4 + 2][0] = 0.6;

  rows[0][1] = 100.0;
  rows[1][1] = 300.0;
  rows[2][1] = 50.0;
  rows[3][1] = 50.0;
  for class in 0..CLASSES {
    rows[4 + class][1] = 0.2;
  }
  rows[4 + 3][1] = 0.55;

  let bytes: Vec<u8> = rows
    .iter()
    .flat_map(|row| row.iter().flat_map(|v| v.to_le_bytes()))
    .collect();
  std::fs::write(path, bytes).unwrap();
}

fn replay_model(dir: &Path) -> ReplayModel {
  let path = dir.join("output.bin");
  write_tensor(&path);
  let url = Url::parse(&format!(
    "replay://{}?classes={}&anchors={}",
    path.display(),
    CLASSES,
    ANCHORS
  ))
  .unwrap();
  ReplayModelBuilder::from_url(&url).unwrap().build().unwrap()
}

fn pipeline(dir: &Path, threshold: f32) -> DetectionPipeline<ReplayModel> {
  let config = PipelineConfig::default().with_decode(
    DecodeConfig::default()
      .with_convention(CoordConvention::CanvasPixelsToCanvas)
      .with_confidence_threshold(threshold)
      .with_shape(CLASSES, ANCHORS),
  );
  DetectionPipeline::new(LabelSet::default_labels(), Some(replay_model(dir)), config)
}

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
  found
}

#[test]
fn replayed_output_maps_back_to_the_source_frame() {
  let dir = tempfile::tempdir().unwrap();
  let pipeline = pipeline(dir.path(), 0.5);

  let result = pipeline.detect(&RgbImage::new(1280, 720)).unwrap();

  assert_eq!(result.len(), 2);
  let first = &result.items[0];
  assert_eq!(first.label, "Alive Trunk");
  assert_eq!(first.class_index, 1);
  assert_eq!(first.score, 0.9);
  assert_eq!(
    (
      first.bbox.left,
      first.bbox.top,
      first.bbox.right,
      first.bbox.bottom
    ),
    (540.0, 260.0, 740.0, 460.0)
  );
  assert_eq!(first.display_label(), "Alive Trunk (90.0%)");

  let second = &result.items[1];
  assert_eq!(second.label, "Dead Trunk");
  // (100 - 25) / 0.5 = 150, (300 - 25 - 140) / 0.5 = 270
  assert_eq!((second.bbox.left, second.bbox.top), (150.0, 270.0));
}

#[test]
fn detection_is_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let pipeline = pipeline(dir.path(), 0.5);
  let image = RgbImage::from_pixel(1280, 720, Rgb([10, 80, 20]));

  assert_eq!(
    pipeline.detect(&image).unwrap(),
    pipeline.detect(&image).unwrap()
  );
}

#[test]
fn raising_the_threshold_only_removes_detections() {
  let dir = tempfile::tempdir().unwrap();
  let image = RgbImage::new(1280, 720);

  let loose = pipeline(dir.path(), 0.5).detect(&image).unwrap();
  let strict = pipeline(dir.path(), 0.6).detect(&image).unwrap();

  assert_eq!(loose.len(), 2);
  assert_eq!(strict.len(), 1);
  assert!(strict.items.iter().all(|d| loose.items.contains(d)));
}

#[test]
fn short_label_file_falls_back_to_class_index() {
  let dir = tempfile::tempdir().unwrap();
  let labels = dir.path().join("labels.txt");
  std::fs::write(&labels, "Alive Rhizophora\n").unwrap();

  let config =
    PipelineConfig::default().with_decode(DecodeConfig::default().with_shape(CLASSES, ANCHORS));
  let pipeline = DetectionPipeline::new(
    LabelSet::load_or_default(&labels),
    Some(replay_model(dir.path())),
    config,
  );

  let result = pipeline.detect(&RgbImage::new(1280, 720)).unwrap();
  assert_eq!(result.items[0].label, "Class 1");
  assert_eq!(result.items[1].label, "Class 3");
}

#[test]
fn gallery_frames_are_recorded_to_folder() {
  let dir = tempfile::tempdir().unwrap();
  let gallery = dir.path().join("gallery");
  let records = dir.path().join("records");
  std::fs::create_dir_all(&gallery).unwrap();
  for name in ["a.png", "b.png", "c.png"] {
    RgbImage::new(1280, 720).save(gallery.join(name)).unwrap();
  }

  let input =
    InputWrapper::from_url(&Url::parse(&format!("gallery://{}", gallery.display())).unwrap())
      .unwrap();
  let output = OutputWrapper::from_url(
    &Url::parse(&format!("folder://{}?record=json", records.display())).unwrap(),
  )
  .unwrap();

  ContinuousTask::default()
    .run_task(input, pipeline(dir.path(), 0.5), output)
    .unwrap();

  let reports = collect_files(&records, "json");
  assert!(!reports.is_empty() && reports.len() <= 3);
  let report: serde_json::Value =
    serde_json::from_slice(&std::fs::read(&reports[0]).unwrap()).unwrap();
  assert_eq!(report["width"], 1280);
  assert_eq!(report["detections"][0]["label"], "Alive Trunk");
}
