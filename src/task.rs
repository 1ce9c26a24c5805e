// 该文件是 Bakhaw （红树林巡检） 项目的一部分。
// src/task.rs - 任务调度
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

use std::sync::{
  Arc, Condvar, Mutex, MutexGuard, PoisonError,
  atomic::{AtomicBool, Ordering},
};
use std::{thread, time::Duration, time::Instant};
use tracing::{debug, info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    let inferred = now.elapsed();
    info!("推理完成，耗时: {:.2?}", inferred);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

struct SlotState<T> {
  item: Option<T>,
  closed: bool,
  replaced: usize,
}

/// 只保留最新一帧的单槽队列。
///
/// 新帧会替换尚未被取走的旧帧；已被取走正在处理的帧不受影响。
pub struct LatestSlot<T> {
  state: Mutex<SlotState<T>>,
  ready: Condvar,
}

impl<T> Default for LatestSlot<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> LatestSlot<T> {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(SlotState {
        item: None,
        closed: false,
        replaced: 0,
      }),
      ready: Condvar::new(),
    }
  }

  fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 放入一帧，返回是否替换掉了一帧尚未处理的旧帧。关闭后放入的帧会被丢弃。
  pub fn offer(&self, item: T) -> bool {
    let mut state = self.lock();
    if state.closed {
      return false;
    }
    let replaced = state.item.replace(item).is_some();
    if replaced {
      state.replaced += 1;
    }
    drop(state);
    self.ready.notify_one();
    replaced
  }

  /// 取出最新一帧，槽为空时阻塞；槽关闭且为空时返回 `None`
  pub fn take(&self) -> Option<T> {
    let mut state = self.lock();
    loop {
      if let Some(item) = state.item.take() {
        return Some(item);
      }
      if state.closed {
        return None;
      }
      state = self
        .ready
        .wait(state)
        .unwrap_or_else(PoisonError::into_inner);
    }
  }

  pub fn close(&self) {
    self.lock().closed = true;
    self.ready.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    self.lock().closed
  }

  /// 被新帧替换而未处理的帧数
  pub fn replaced_count(&self) -> usize {
    self.lock().replaced
  }
}

// 离开作用域时关闭槽，检测线程 panic 时也能让采集线程退出
struct CloseOnDrop<'a, T>(&'a LatestSlot<T>);

impl<T> Drop for CloseOnDrop<'_, T> {
  fn drop(&mut self) {
    self.0.close();
  }
}

/// 连续检测任务：采集线程不断放入新帧，检测线程总是处理最新的一帧
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  frame_stride: usize,
  stop: Arc<AtomicBool>,
  install_ctrlc: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      frame_stride: 1,
      stop: Arc::new(AtomicBool::new(false)),
      install_ctrlc: false,
    }
  }
}

impl ContinuousTask {
  /// 最多处理的帧数，`None` 表示直到输入结束或被中断
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 每隔 `stride` 帧取一帧进行检测，0 视为 1
  pub fn with_frame_stride(mut self, stride: usize) -> Self {
    self.frame_stride = stride.max(1);
    self
  }

  /// 收到 Ctrl-C 时停止任务
  pub fn with_ctrlc(mut self) -> Self {
    self.install_ctrlc = true;
    self
  }

  /// 外部停止标志，置位后任务在帧边界退出
  pub fn stop_handle(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
    let stop = self.stop.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
  }

  fn produce<F, I: Iterator<Item = F>>(&self, input: I, slot: &LatestSlot<F>) {
    for (index, frame) in input.enumerate() {
      if self.stop.load(Ordering::SeqCst) || slot.is_closed() {
        break;
      }
      if (index + 1) % self.frame_stride != 0 {
        continue;
      }
      if slot.offer(frame) {
        debug!("检测线程繁忙，丢弃未处理的旧帧");
      }
    }
    slot.close();
  }

  fn consume<F, D, M, O>(
    &self,
    slot: &LatestSlot<F>,
    model: M,
    output: O,
  ) -> Result<usize, anyhow::Error>
  where
    M: Model<Input = F, Output = D>,
    M::Error: std::error::Error + Sync + Send + 'static,
    O: Render<F, D>,
    O::Error: std::error::Error + Sync + Send + 'static,
  {
    let mut processed = 0;
    while let Some(frame) = slot.take() {
      processed += 1;
      info!("处理第 {} 帧图像", processed);
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);

      if self.frame_number.is_some_and(|n| processed >= n) {
        info!("达到指定帧数 {}, 退出任务循环", processed);
        break;
      }
      if self.stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }
    Ok(processed)
  }
}

impl<
  F: Send,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F> + Send,
  M: Model<Input = F, Output = D, Error = ME> + Send,
  O: Render<F, D, Error = RE> + Send,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    if self.install_ctrlc {
      self.install_ctrlc_handler()?;
    }

    let slot = LatestSlot::new();
    let processed = thread::scope(|scope| {
      scope.spawn(|| self.produce(input, &slot));
      let worker = scope.spawn(|| {
        let _close = CloseOnDrop(&slot);
        self.consume(&slot, model, output)
      });
      worker
        .join()
        .unwrap_or_else(|_| Err(anyhow::anyhow!("检测线程异常退出")))
    })?;

    info!(
      "任务完成，共处理 {} 帧，丢弃 {} 帧",
      processed,
      slot.replaced_count()
    );
    Ok(())
  }
}
