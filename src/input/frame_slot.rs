//! 最新帧槽位 (Latest-frame slot)
//!
//! 采集线程写, 处理线程读。槽位只存一帧, 新帧直接覆盖旧帧。

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::Frame;

#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
    ready: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        // 写入方只做整帧替换, 锁中毒时数据仍然完整
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 覆盖最新帧并唤醒等待方
    pub fn publish(&self, frame: Frame) {
        *self.lock() = Some(frame);
        self.ready.notify_all();
    }

    /// 最新帧; 尚未采集到任何帧时返回 None
    pub fn latest(&self) -> Option<Frame> {
        self.lock().clone()
    }

    /// 等待比 `after` 更新的帧, 最多等待 `timeout`
    pub fn wait_newer(&self, after: Option<u64>, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock();
        loop {
            if let Some(frame) = guard.as_ref() {
                if after.map_or(true, |seq| frame.seq() > seq) {
                    return Some(frame.clone());
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            guard = match self.ready.wait_timeout(guard, deadline - now) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
    }

    /// 唤醒所有等待方 (停止时使用)
    pub fn wake_all(&self) {
        self.ready.notify_all();
    }
}
