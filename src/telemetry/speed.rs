use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serde_json::Value;
use tracing::{debug, info, warn};

/// 共享车速, 以 f32 位模式存放在原子变量中
#[derive(Clone, Debug, Default)]
pub struct SpeedGauge {
    bits: Arc<AtomicU32>,
}

impl SpeedGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kmh(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set_kmh(&self, kmh: f32) {
        let kmh = if kmh.is_finite() { kmh.max(0.0) } else { 0.0 };
        self.bits.store(kmh.to_bits(), Ordering::Relaxed);
    }
}

/// 解析 `gps_speed.data[-1][1][0]` (m/s) 并换算为 km/h
///
/// 没有 `gps_speed` 字段时返回 `Ok(None)` (保持原车速)。
pub fn parse_gps_speed(doc: &Value) -> Result<Option<f32>, String> {
    let Some(gps) = doc.get("gps_speed") else {
        return Ok(None);
    };
    let speed_ms = gps
        .get("data")
        .and_then(Value::as_array)
        .and_then(|samples| samples.last())
        .and_then(|sample| sample.get(1))
        .and_then(|values| values.get(0))
        .and_then(Value::as_f64)
        .ok_or_else(|| "gps_speed 数据格式异常".to_string())?;
    Ok(Some((speed_ms * 3.6) as f32))
}

/// 传感器轮询线程
pub struct SpeedPoller {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SpeedPoller {
    pub fn start(sensor_url: &str, interval: Duration, gauge: SpeedGauge) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let url = sensor_url.to_string();
        let agent = ureq::AgentBuilder::new().timeout(interval).build();

        let handle = thread::Builder::new()
            .name("speed-poller".into())
            .spawn(move || {
                info!("🛰️ 车速轮询启动: {} (每{:?})", url, interval);
                loop {
                    match poll_once(&agent, &url) {
                        Ok(Some(kmh)) => {
                            gauge.set_kmh(kmh);
                            debug!("🚌 车速: {:.1} km/h", kmh);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            // GPS 丢失或网络故障按静止处理
                            if gauge.kmh() > 0.0 {
                                warn!("⚠️ 车速读取失败, 归零: {}", e);
                            }
                            gauge.set_kmh(0.0);
                        }
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                info!("🛑 车速轮询已停止");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        // 关闭发送端即可唤醒轮询线程
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SpeedPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_once(agent: &ureq::Agent, url: &str) -> Result<Option<f32>, String> {
    let doc: Value = agent
        .get(url)
        .call()
        .map_err(|e| e.to_string())?
        .into_json()
        .map_err(|e| e.to_string())?;
    parse_gps_speed(&doc)
}
