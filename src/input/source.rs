/// 帧源 (Frame source)
///
/// 采集线程独占传输层, 以传输层允许的最快速度覆盖最新帧槽位。
/// 停止时先让采集循环退出, 再在同一线程里释放连接。
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use super::{open_transport, Frame, FrameSlot, FrameTransport};

/// 暂时无帧时的让出间隔
const IDLE_BACKOFF: Duration = Duration::from_millis(5);
/// 重连退避上限
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// 采集统计 (采集线程写, 任意线程读)
#[derive(Debug, Default)]
pub struct SourceStats {
    captured: AtomicU64,
    failures: AtomicU64,
    reconnects: AtomicU64,
}

impl SourceStats {
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

pub struct FrameSource {
    slot: Arc<FrameSlot>,
    stop: Arc<AtomicBool>,
    stats: Arc<SourceStats>,
    handle: Option<JoinHandle<()>>,
    describe: String,
}

impl FrameSource {
    /// 按地址建立连接并启动采集线程
    pub fn start(locator: &str, timeout: Duration) -> Result<Self> {
        let transport = open_transport(locator, timeout)
            .with_context(|| format!("无法连接视频源: {}", locator))?;
        Self::spawn(transport)
    }

    /// 使用已建立的传输层启动采集线程
    pub fn spawn<T: FrameTransport + 'static>(transport: T) -> Result<Self> {
        let slot = Arc::new(FrameSlot::new());
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(SourceStats::default());
        let describe = transport.describe();

        let handle = {
            let slot = slot.clone();
            let stop = stop.clone();
            let stats = stats.clone();
            thread::Builder::new()
                .name("frame-acquisition".into())
                .spawn(move || acquisition_loop(transport, &slot, &stop, &stats))
                .context("采集线程启动失败")?
        };

        info!("🎬 采集线程启动: {}", describe);
        Ok(Self {
            slot,
            stop,
            stats,
            handle: Some(handle),
            describe,
        })
    }

    /// 最新帧; 尚未采集到任何帧时返回 None
    pub fn latest(&self) -> Option<Frame> {
        self.slot.latest()
    }

    /// 阻塞等待比 `after` 更新的帧 (超时返回 None)
    pub fn wait_newer(&self, after: Option<u64>, timeout: Duration) -> Option<Frame> {
        if self.stop.load(Ordering::Acquire) {
            return None;
        }
        self.slot.wait_newer(after, timeout)
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn describe(&self) -> &str {
        &self.describe
    }

    /// 通知采集循环退出并等待其结束; 多次调用无副作用
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        self.slot.wake_all();
        if handle.join().is_err() {
            error!("❌ 采集线程异常退出: {}", self.describe);
        }
        info!(
            "🛑 采集线程已停止: {} (共采集{}帧, 失败{}次, 重连{}次)",
            self.describe,
            self.stats.captured(),
            self.stats.failures(),
            self.stats.reconnects()
        );
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn acquisition_loop<T: FrameTransport>(
    mut transport: T,
    slot: &FrameSlot,
    stop: &AtomicBool,
    stats: &SourceStats,
) {
    let mut seq: u64 = 0;
    let mut backoff = Duration::from_millis(200);
    let mut last_report = Instant::now();
    let mut window_frames = 0u64;

    while !stop.load(Ordering::Acquire) {
        match transport.read() {
            Ok(Some(image)) => {
                seq += 1;
                window_frames += 1;
                stats.captured.fetch_add(1, Ordering::Relaxed);
                slot.publish(Frame::new(seq, image));
                backoff = Duration::from_millis(200);
            }
            Ok(None) => thread::sleep(IDLE_BACKOFF),
            Err(e) if e.is_transient() => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                debug!("⚠️ 暂时无帧: {}", e);
                thread::sleep(IDLE_BACKOFF);
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️ 视频流中断: {}, {:?}后重连", e, backoff);
                sleep_unless_stopped(backoff, stop);
                if stop.load(Ordering::Acquire) {
                    break;
                }
                match transport.reconnect() {
                    Ok(()) => {
                        stats.reconnects.fetch_add(1, Ordering::Relaxed);
                        info!("✅ 视频流已重连: {}", transport.describe());
                    }
                    Err(e) => warn!("⚠️ 重连失败: {}", e),
                }
                backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let fps = window_frames as f64 / last_report.elapsed().as_secs_f64();
            debug!("📺 采集统计: {:.1}fps | 累计{}帧", fps, stats.captured());
            window_frames = 0;
            last_report = Instant::now();
        }
    }

    // 循环已退出, 不会再有读取使用该连接
    transport.release();
}

fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}
