/// 心跳线程 (HeartbeatService)
///
/// 与检测路径无共享状态, 只共享被监控对象的标识。失败只记录日志,
/// 下一个周期即为重试。
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{info, warn};

use super::MonitorLink;

const UNKNOWN: u8 = 0;
const DISABLED: u8 = 1;
const ENABLED: u8 = 2;

#[derive(Debug, Default)]
struct HeartbeatState {
    system_enabled: AtomicU8,
    sent: AtomicU64,
    failed: AtomicU64,
}

pub struct HeartbeatService {
    state: Arc<HeartbeatState>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatService {
    /// 启动后立即发送第一次心跳, 之后每 `interval` 一次
    pub fn start(
        link: Arc<dyn MonitorLink>,
        entity_id: &str,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let state = Arc::new(HeartbeatState::default());
        let entity_id = entity_id.to_string();

        let handle = {
            let state = state.clone();
            thread::Builder::new()
                .name("heartbeat".into())
                .spawn(move || {
                    info!("❤️ 心跳线程启动 (每{:?})", interval);
                    loop {
                        beat(link.as_ref(), &entity_id, &state);
                        match stop_rx.recv_timeout(interval) {
                            Err(RecvTimeoutError::Timeout) => continue,
                            _ => break,
                        }
                    }
                    info!("🛑 心跳线程已停止");
                })?
        };

        Ok(Self {
            state,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// 服务端最近一次返回的启用标志; 尚未收到时为 None
    pub fn system_enabled(&self) -> Option<bool> {
        match self.state.system_enabled.load(Ordering::Relaxed) {
            ENABLED => Some(true),
            DISABLED => Some(false),
            _ => None,
        }
    }

    pub fn sent(&self) -> u64 {
        self.state.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.state.failed.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn beat(link: &dyn MonitorLink, entity_id: &str, state: &HeartbeatState) {
    match link.heartbeat(entity_id) {
        Ok(ack) => {
            state.sent.fetch_add(1, Ordering::Relaxed);
            let flag = match ack.system_enabled {
                Some(true) => ENABLED,
                Some(false) => DISABLED,
                None => UNKNOWN,
            };
            let previous = state.system_enabled.swap(flag, Ordering::Relaxed);
            let label = match flag {
                ENABLED => "enabled",
                DISABLED => "disabled",
                _ => "unknown",
            };
            info!("❤️ 心跳已发送 - 系统{}", label);
            if previous != UNKNOWN && previous != flag {
                warn!("🔁 远程系统状态变化: {}", label);
            }
        }
        Err(e) => {
            state.failed.fetch_add(1, Ordering::Relaxed);
            warn!("⚠️ 心跳失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::testing::RecordingLink;
    use crate::alert::HeartbeatAck;

    #[test]
    fn test_first_beat_is_immediate_and_flag_surfaced() {
        let link = Arc::new(RecordingLink::accepting().with_ack(HeartbeatAck {
            system_enabled: Some(false),
        }));
        let mut hb = HeartbeatService::start(link.clone(), "bus-7", Duration::from_secs(60)).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(link.heartbeats(), 1);
        assert_eq!(hb.system_enabled(), Some(false));
        hb.stop();
    }

    #[test]
    fn test_failures_do_not_stop_the_loop() {
        let link = Arc::new(RecordingLink::rejecting());
        let mut hb = HeartbeatService::start(link.clone(), "bus-7", Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(100));
        hb.stop();
        assert!(hb.failed() >= 3);
        assert_eq!(hb.sent(), 0);
        assert_eq!(hb.system_enabled(), None);
    }

    #[test]
    fn test_stop_is_prompt() {
        let link = Arc::new(RecordingLink::accepting());
        let mut hb = HeartbeatService::start(link, "bus-7", Duration::from_secs(3600)).unwrap();
        let started = std::time::Instant::now();
        hb.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        hb.stop();
    }
}
