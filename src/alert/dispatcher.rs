/// 告警分发器 (AlertDispatcher)
///
/// 冷却判断在入队/发送前完成, 处理线程从不等待网络 (后台模式)。
/// 冷却表只由处理线程读写; 后台发送线程通过失败通道回报结果。
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{AlertEvent, CooldownKey, CooldownTracker, MonitorLink};
use crate::safety::SafetyVerdict;

/// 冷却时间戳的记录时机
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPolicy {
    /// 发送尝试即占用冷却窗口 (发送失败也不撤销)
    #[default]
    OnAttempt,
    /// 发送失败时撤销本次占用, 下一帧可以重新告警
    OnSuccess,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// 在处理线程中同步发送
    Inline,
    /// 有界队列 + 后台发送线程
    #[default]
    Background,
}

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub entity_id: String,
    pub cooldown: Duration,
    pub policy: CooldownPolicy,
    pub delivery: DeliveryMode,
    pub queue_capacity: usize,
}

/// 单次分发结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// SAFE 判定不上报
    NotReportable,
    /// 冷却中, 未产生任何网络请求
    Suppressed,
    Delivered,
    Rejected,
    Queued,
    /// 队列已满, 告警丢弃并归还冷却窗口
    QueueFull,
}

impl Dispatch {
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Delivered | Self::Queued)
    }
}

#[derive(Debug, Default)]
pub struct DispatchStats {
    sent: AtomicU64,
    failed: AtomicU64,
    suppressed: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct Job {
    event: AlertEvent,
    key: CooldownKey,
    attempted_at: Instant,
}

struct Failure {
    key: CooldownKey,
    attempted_at: Instant,
}

enum Delivery {
    Inline(Arc<dyn MonitorLink>),
    Background {
        tx: Option<Sender<Job>>,
        failures: Receiver<Failure>,
        handle: Option<JoinHandle<()>>,
    },
}

pub struct AlertDispatcher {
    entity_id: String,
    cooldown: CooldownTracker,
    policy: CooldownPolicy,
    delivery: Delivery,
    stats: Arc<DispatchStats>,
}

impl AlertDispatcher {
    pub fn new(config: DispatcherConfig, link: Arc<dyn MonitorLink>) -> std::io::Result<Self> {
        let stats = Arc::new(DispatchStats::default());
        let delivery = match config.delivery {
            DeliveryMode::Inline => Delivery::Inline(link),
            DeliveryMode::Background => {
                let (tx, rx) = bounded::<Job>(config.queue_capacity.max(1));
                let (fail_tx, failures) = unbounded::<Failure>();
                let worker_stats = stats.clone();
                let handle = thread::Builder::new()
                    .name("alert-sender".into())
                    .spawn(move || delivery_worker(rx, fail_tx, link, worker_stats))?;
                Delivery::Background {
                    tx: Some(tx),
                    failures,
                    handle: Some(handle),
                }
            }
        };

        info!(
            "📡 告警分发器就绪 | 冷却{:?} | 策略{:?} | 模式{:?}",
            config.cooldown, config.policy, config.delivery
        );
        Ok(Self {
            entity_id: config.entity_id,
            cooldown: CooldownTracker::new(config.cooldown),
            policy: config.policy,
            delivery,
            stats,
        })
    }

    /// 内联: 服务端返回 201 为 true; 后台: 成功入队为 true
    pub fn send(&mut self, verdict: &SafetyVerdict) -> bool {
        self.dispatch_at(verdict, Instant::now()).accepted()
    }

    pub fn dispatch_at(&mut self, verdict: &SafetyVerdict, now: Instant) -> Dispatch {
        if !verdict.is_hazard() {
            return Dispatch::NotReportable;
        }
        self.reconcile();

        let key = CooldownKey::of(verdict);
        if !self.cooldown.try_acquire(&key, now) {
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!("⏳ 冷却中, 跳过告警: {}", key);
            return Dispatch::Suppressed;
        }

        let event = AlertEvent::from_verdict(&self.entity_id, verdict, Utc::now());
        match &self.delivery {
            Delivery::Inline(link) => match link.post_alert(&event) {
                Ok(()) => {
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                    info!("🚨 告警已发送: {} - {}", event.severity, event.message);
                    Dispatch::Delivered
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("⚠️ 告警发送失败: {} ({})", key, e);
                    if self.policy == CooldownPolicy::OnSuccess {
                        self.cooldown.release_if(&key, now);
                    }
                    Dispatch::Rejected
                }
            },
            Delivery::Background { tx: Some(tx), .. } => {
                let job = Job {
                    event,
                    key: key.clone(),
                    attempted_at: now,
                };
                match tx.try_send(job) {
                    Ok(()) => Dispatch::Queued,
                    Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("⚠️ 告警队列已满, 丢弃: {}", key);
                        self.cooldown.release_if(&key, now);
                        Dispatch::QueueFull
                    }
                }
            }
            Delivery::Background { tx: None, .. } => {
                self.cooldown.release_if(&key, now);
                Dispatch::QueueFull
            }
        }
    }

    /// 处理后台线程回报的失败 (仅 OnSuccess 策略撤销冷却)
    fn reconcile(&mut self) {
        let Delivery::Background { failures, .. } = &self.delivery else {
            return;
        };
        for failure in failures.try_iter() {
            if self.policy == CooldownPolicy::OnSuccess
                && self.cooldown.release_if(&failure.key, failure.attempted_at)
            {
                debug!("↩️ 发送失败, 冷却已撤销: {}", failure.key);
            }
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    /// 停止接收新告警, 等待队列中的告警发送完毕 (每个请求自带超时)
    pub fn shutdown(&mut self) {
        if let Delivery::Background { tx, handle, .. } = &mut self.delivery {
            tx.take();
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    error!("❌ 告警发送线程异常退出");
                }
                info!(
                    "🛑 告警分发器已停止 (发送{}条, 失败{}条, 丢弃{}条)",
                    self.stats.sent(),
                    self.stats.failed(),
                    self.stats.dropped()
                );
            }
        }
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn delivery_worker(
    rx: Receiver<Job>,
    failures: Sender<Failure>,
    link: Arc<dyn MonitorLink>,
    stats: Arc<DispatchStats>,
) {
    for job in rx.iter() {
        match link.post_alert(&job.event) {
            Ok(()) => {
                stats.sent.fetch_add(1, Ordering::Relaxed);
                info!("🚨 告警已发送: {} - {}", job.event.severity, job.event.message);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️ 告警发送失败: {} ({})", job.key, e);
                let _ = failures.send(Failure {
                    key: job.key,
                    attempted_at: job.attempted_at,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::testing::RecordingLink;
    use crate::safety::{PriorityTable, Severity};

    fn config(delivery: DeliveryMode, policy: CooldownPolicy) -> DispatcherConfig {
        DispatcherConfig {
            entity_id: "bus-7".into(),
            cooldown: Duration::from_secs(5),
            policy,
            delivery,
            queue_capacity: 8,
        }
    }

    fn phone() -> SafetyVerdict {
        let set = [("phone_use", 0.9)].into_iter().collect();
        PriorityTable::driver().resolve(&set)
    }

    #[test]
    fn test_inline_cooldown_at_0_3_6() {
        let link = Arc::new(RecordingLink::accepting());
        let mut d = AlertDispatcher::new(config(DeliveryMode::Inline, CooldownPolicy::OnAttempt), link.clone()).unwrap();
        let t0 = Instant::now();

        assert_eq!(d.dispatch_at(&phone(), t0), Dispatch::Delivered);
        let started = Instant::now();
        assert_eq!(d.dispatch_at(&phone(), t0 + Duration::from_secs(3)), Dispatch::Suppressed);
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(link.alerts().len(), 1);
        assert_eq!(d.dispatch_at(&phone(), t0 + Duration::from_secs(6)), Dispatch::Delivered);
        assert_eq!(link.alerts().len(), 2);
    }

    #[test]
    fn test_suppressed_send_never_reaches_remote() {
        let link = Arc::new(RecordingLink::accepting());
        let mut d = AlertDispatcher::new(config(DeliveryMode::Inline, CooldownPolicy::OnAttempt), link.clone()).unwrap();
        assert!(d.send(&phone()));
        for _ in 0..10 {
            assert!(!d.send(&phone()));
        }
        let alerts = link.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "phone_use");
        assert_eq!(d.stats().suppressed(), 10);
    }

    #[test]
    fn test_safe_verdict_is_not_sent() {
        let link = Arc::new(RecordingLink::accepting());
        let mut d = AlertDispatcher::new(config(DeliveryMode::Inline, CooldownPolicy::OnAttempt), link.clone()).unwrap();
        assert_eq!(d.dispatch_at(&SafetyVerdict::safe("ok"), Instant::now()), Dispatch::NotReportable);
        assert!(link.alerts().is_empty());
        assert!(d.cooldown().is_empty());
    }

    #[test]
    fn test_failed_attempt_consumes_window_on_attempt() {
        let link = Arc::new(RecordingLink::rejecting());
        let mut d = AlertDispatcher::new(config(DeliveryMode::Inline, CooldownPolicy::OnAttempt), link.clone()).unwrap();
        let t0 = Instant::now();
        assert_eq!(d.dispatch_at(&phone(), t0), Dispatch::Rejected);
        assert_eq!(d.dispatch_at(&phone(), t0 + Duration::from_secs(1)), Dispatch::Suppressed);
        assert_eq!(link.alerts().len(), 1);
    }

    #[test]
    fn test_failed_attempt_released_on_success_policy() {
        let link = Arc::new(RecordingLink::rejecting());
        let mut d = AlertDispatcher::new(config(DeliveryMode::Inline, CooldownPolicy::OnSuccess), link.clone()).unwrap();
        let t0 = Instant::now();
        assert_eq!(d.dispatch_at(&phone(), t0), Dispatch::Rejected);
        assert_eq!(d.dispatch_at(&phone(), t0 + Duration::from_secs(1)), Dispatch::Rejected);
        assert_eq!(link.alerts().len(), 2);
    }

    #[test]
    fn test_background_delivers_and_drains_on_shutdown() {
        let link = Arc::new(RecordingLink::accepting());
        let mut d = AlertDispatcher::new(config(DeliveryMode::Background, CooldownPolicy::OnAttempt), link.clone()).unwrap();
        let t0 = Instant::now();
        let mut drowsy = phone();
        drowsy.alert_type = "drowsy".into();
        drowsy.severity = Severity::Critical;

        assert_eq!(d.dispatch_at(&phone(), t0), Dispatch::Queued);
        assert_eq!(d.dispatch_at(&drowsy, t0), Dispatch::Queued);
        assert_eq!(d.dispatch_at(&phone(), t0 + Duration::from_secs(1)), Dispatch::Suppressed);
        d.shutdown();
        assert_eq!(link.alerts().len(), 2);
        assert_eq!(d.stats().sent(), 2);
    }

    #[test]
    fn test_background_cooldown_at_0_3_6() {
        let link = Arc::new(RecordingLink::accepting());
        let mut d = AlertDispatcher::new(config(DeliveryMode::Background, CooldownPolicy::OnAttempt), link.clone()).unwrap();
        let t0 = Instant::now();

        assert_eq!(d.dispatch_at(&phone(), t0), Dispatch::Queued);
        let started = Instant::now();
        assert_eq!(d.dispatch_at(&phone(), t0 + Duration::from_secs(3)), Dispatch::Suppressed);
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(d.dispatch_at(&phone(), t0 + Duration::from_secs(6)), Dispatch::Queued);

        d.shutdown();
        let alerts = link.alerts();
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.alert_type == "phone_use"));
        assert_eq!(d.stats().sent(), 2);
        assert_eq!(d.stats().suppressed(), 1);
    }

    #[test]
    fn test_background_failure_reconciled_on_success_policy() {
        let link = Arc::new(RecordingLink::rejecting());
        let mut d = AlertDispatcher::new(config(DeliveryMode::Background, CooldownPolicy::OnSuccess), link.clone()).unwrap();
        let t0 = Instant::now();
        assert_eq!(d.dispatch_at(&phone(), t0), Dispatch::Queued);

        // 冷却中的调用不改变状态, 可以反复尝试直到失败回报被处理
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut outcome = Dispatch::Suppressed;
        while Instant::now() < deadline {
            outcome = d.dispatch_at(&phone(), t0 + Duration::from_secs(1));
            if outcome != Dispatch::Suppressed {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(outcome, Dispatch::Queued);
    }

    #[test]
    fn test_full_queue_releases_window() {
        let link = Arc::new(RecordingLink::blocking(Duration::from_millis(200)));
        let mut cfg = config(DeliveryMode::Background, CooldownPolicy::OnAttempt);
        cfg.queue_capacity = 1;
        let mut d = AlertDispatcher::new(cfg, link.clone()).unwrap();
        let t0 = Instant::now();

        let verdict = |name: &str| {
            let mut v = phone();
            v.alert_type = name.into();
            v
        };
        // 第一条被发送线程取走并阻塞, 第二条占满队列
        assert_eq!(d.dispatch_at(&verdict("a"), t0), Dispatch::Queued);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(d.dispatch_at(&verdict("b"), t0), Dispatch::Queued);
        assert_eq!(d.dispatch_at(&verdict("c"), t0), Dispatch::QueueFull);
        assert!(d.cooldown().remaining(&CooldownKey::of(&verdict("c")), t0).is_none());
        d.shutdown();
        assert_eq!(d.stats().dropped(), 1);
    }
}
