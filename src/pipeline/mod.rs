/// 处理流水线 (Processing Pipeline)
///
/// 每帧严格按顺序: 检测 → 判定 → 防抖 → 分发 → 渲染
/// - MonitorState: 处理线程独占的状态 (冷却表 + 防抖计数器)
/// - Pipeline:     处理循环
/// - StatusSink:   状态输出 (日志 / 快照)
pub mod sink;

pub use sink::{LogStatusSink, SnapshotSink, StatusSink};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::alert::{AlertDispatcher, Dispatch};
use crate::detection::{DetectionAdapter, DetectionSet};
use crate::input::{Frame, FrameSource};
use crate::safety::{dominant, DisplayState, HysteresisTracker, SafetyResolver, SafetyVerdict};

/// 等待新帧的单次上限, 到期后重新检查停止标志
const FRAME_WAIT: Duration = Duration::from_millis(500);

/// 处理线程独占的可变状态
pub struct MonitorState {
    pub hysteresis: HysteresisTracker,
    pub dispatcher: AlertDispatcher,
}

impl MonitorState {
    pub fn new(display_threshold: u32, dispatcher: AlertDispatcher) -> Self {
        Self {
            hysteresis: HysteresisTracker::new(display_threshold),
            dispatcher,
        }
    }
}

/// 单帧处理结果
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub seq: Option<u64>,
    pub detections: DetectionSet,
    pub verdicts: Vec<SafetyVerdict>,
    pub display: DisplayState,
    pub counter: u32,
    pub threshold: u32,
    pub dispatches: Vec<Dispatch>,
}

impl FrameReport {
    /// 本帧最严重的危险判定
    pub fn headline(&self) -> Option<&SafetyVerdict> {
        dominant(&self.verdicts)
    }

    pub fn dispatched(&self) -> usize {
        self.dispatches.iter().filter(|d| d.accepted()).count()
    }
}

pub struct Pipeline<D: DetectionAdapter> {
    detector: D,
    resolver: SafetyResolver,
    state: MonitorState,
    sinks: Vec<Box<dyn StatusSink>>,

    // 统计
    processed: u64,
    count: u64,
    last: Instant,
    latency: Duration,
}

impl<D: DetectionAdapter> Pipeline<D> {
    pub fn new(detector: D, resolver: SafetyResolver, state: MonitorState) -> Self {
        Self {
            detector,
            resolver,
            state,
            sinks: Vec::new(),
            processed: 0,
            count: 0,
            last: Instant::now(),
            latency: Duration::ZERO,
        }
    }

    pub fn with_sink(mut self, sink: impl StatusSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// 最近一帧从采集到开始处理的延迟
    pub fn frame_latency(&self) -> Duration {
        self.latency
    }

    /// 判定 → 防抖 → 分发 (不经过检测器)
    pub fn process(&mut self, detections: &DetectionSet) -> FrameReport {
        self.process_at(detections, Instant::now())
    }

    pub fn process_at(&mut self, detections: &DetectionSet, now: Instant) -> FrameReport {
        let verdicts = self.resolver.resolve(detections);
        let display = self.state.hysteresis.update(dominant(&verdicts));
        let dispatches = verdicts
            .iter()
            .filter(|v| v.is_hazard())
            .map(|v| self.state.dispatcher.dispatch_at(v, now))
            .collect();

        FrameReport {
            seq: None,
            detections: detections.clone(),
            verdicts,
            display,
            counter: self.state.hysteresis.counter(),
            threshold: self.state.hysteresis.threshold(),
            dispatches,
        }
    }

    /// 单帧完整处理; 检测失败时跳过本帧
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport> {
        self.latency = frame.age();
        let detections = self.detector.detect(frame)?;
        let mut report = self.process(&detections);
        report.seq = Some(frame.seq());
        for sink in self.sinks.iter_mut() {
            sink.on_frame(Some(frame), &report);
        }
        self.processed += 1;
        self.tick();
        Ok(report)
    }

    /// 处理循环: 等待比上一帧更新的帧, 直到 `running` 被清除或达到 `max_frames`
    pub fn run(
        &mut self,
        source: &FrameSource,
        running: &AtomicBool,
        max_frames: Option<u64>,
    ) -> u64 {
        info!("🔍 处理循环启动 (检测器: {})", self.detector.name());
        let mut last_seq = None;
        let mut waiting_logged = false;

        while running.load(Ordering::Acquire) {
            let Some(frame) = source.wait_newer(last_seq, FRAME_WAIT) else {
                if last_seq.is_none() && !waiting_logged {
                    info!("⏳ 等待第一帧: {}", source.describe());
                    waiting_logged = true;
                }
                continue;
            };
            if let Some(prev) = last_seq {
                let skipped = frame.seq().saturating_sub(prev + 1);
                if skipped > 0 {
                    debug!("⏭️ 跳过{}帧", skipped);
                }
            }
            last_seq = Some(frame.seq());

            if let Err(e) = self.process_frame(&frame) {
                warn!("⚠️ 帧#{} 检测失败: {:#}", frame.seq(), e);
            }
            if max_frames.map_or(false, |max| self.processed >= max) {
                info!("🏁 已处理{}帧, 达到上限", self.processed);
                break;
            }
        }
        self.processed
    }

    fn tick(&mut self) {
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            let stats = self.state.dispatcher.stats();
            info!(
                "📊 处理{:.1}fps | 帧延迟{}ms | 计数器{}/{} | 告警 发送{} 冷却{} 失败{}",
                self.count as f64 / elapsed,
                self.latency.as_millis(),
                self.state.hysteresis.counter(),
                self.state.hysteresis.threshold(),
                stats.sent(),
                stats.suppressed(),
                stats.failed()
            );
            self.count = 0;
            self.last = Instant::now();
        }
    }

    /// 停止告警发送线程并返回状态
    pub fn into_state(mut self) -> MonitorState {
        self.state.dispatcher.shutdown();
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::testing::RecordingLink;
    use crate::alert::{CooldownPolicy, DeliveryMode, DispatcherConfig};
    use crate::detection::ReplayDetector;
    use crate::input::FrameTransport;
    use crate::safety::{LimbClassifier, PriorityTable};
    use std::sync::Arc;

    fn dispatcher(link: Arc<RecordingLink>) -> AlertDispatcher {
        AlertDispatcher::new(
            DispatcherConfig {
                entity_id: "bus-7".into(),
                cooldown: Duration::from_secs(5),
                policy: CooldownPolicy::OnAttempt,
                delivery: DeliveryMode::Inline,
                queue_capacity: 4,
            },
            link,
        )
        .unwrap()
    }

    fn set(items: &[(&str, f32)]) -> DetectionSet {
        items.iter().copied().collect()
    }

    #[test]
    fn test_phone_blip_dispatches_once_without_escalation() {
        let link = Arc::new(RecordingLink::accepting());
        let mut pipeline = Pipeline::new(
            ReplayDetector::new(Vec::new()),
            SafetyResolver::Exclusive(PriorityTable::driver()),
            MonitorState::new(10, dispatcher(link.clone())),
        );

        let frames = [
            set(&[]),
            set(&[("phone_use", 0.3)]),
            set(&[]),
            set(&[]),
            set(&[]),
        ];
        let t0 = Instant::now();
        let reports: Vec<_> = frames
            .iter()
            .enumerate()
            .map(|(i, f)| pipeline.process_at(f, t0 + Duration::from_millis(100 * i as u64)))
            .collect();

        let counters: Vec<u32> = reports.iter().map(|r| r.counter).collect();
        assert_eq!(counters, vec![0, 1, 0, 0, 0]);
        let dispatched: Vec<usize> = reports.iter().map(|r| r.dispatched()).collect();
        assert_eq!(dispatched, vec![0, 1, 0, 0, 0]);
        assert!(reports.iter().all(|r| r.display != DisplayState::Escalated));

        let alerts = link.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "phone_use");
        assert_eq!(alerts[0].entity_id, "bus-7");
    }

    #[test]
    fn test_alert_sent_before_display_escalates() {
        let link = Arc::new(RecordingLink::accepting());
        let mut pipeline = Pipeline::new(
            ReplayDetector::new(Vec::new()),
            SafetyResolver::Exclusive(PriorityTable::driver()),
            MonitorState::new(10, dispatcher(link.clone())),
        );
        let report = pipeline.process(&set(&[("Drowsy", 0.9)]));
        assert_eq!(report.display, DisplayState::Clear);
        assert_eq!(report.dispatched(), 1);
    }

    #[test]
    fn test_independent_verdicts_each_dispatched() {
        let link = Arc::new(RecordingLink::accepting());
        let mut pipeline = Pipeline::new(
            ReplayDetector::new(Vec::new()),
            SafetyResolver::Independent(LimbClassifier::window()),
            MonitorState::new(1, dispatcher(link.clone())),
        );
        let report = pipeline.process(&set(&[("left_hand", 0.8), ("head_out", 0.9)]));
        assert_eq!(report.dispatches, vec![Dispatch::Delivered, Dispatch::Delivered]);
        assert_eq!(report.display, DisplayState::Escalated);
        assert_eq!(link.alerts().len(), 2);
    }

    #[test]
    fn test_process_frame_records_frame_latency() {
        let link = Arc::new(RecordingLink::accepting());
        let mut pipeline = Pipeline::new(
            ReplayDetector::new(vec![set(&[])]),
            SafetyResolver::Exclusive(PriorityTable::driver()),
            MonitorState::new(10, dispatcher(link)),
        );
        assert_eq!(pipeline.frame_latency(), Duration::ZERO);

        let frame = Frame::blank(7, 8, 8);
        std::thread::sleep(Duration::from_millis(20));
        let report = pipeline.process_frame(&frame).unwrap();
        assert_eq!(report.seq, Some(7));
        assert!(pipeline.frame_latency() >= Duration::from_millis(20));
    }

    struct Endless;

    impl FrameTransport for Endless {
        fn read(&mut self) -> Result<Option<image::RgbImage>, crate::error::TransportError> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(Some(image::RgbImage::new(8, 8)))
        }

        fn reconnect(&mut self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }

        fn release(&mut self) {}

        fn describe(&self) -> String {
            "endless".into()
        }
    }

    #[test]
    fn test_run_consumes_live_frames_until_limit() {
        let link = Arc::new(RecordingLink::accepting());
        let script = vec![set(&[("phone_use", 0.9)]), set(&[]), set(&[("phone_use", 0.9)])];
        let mut pipeline = Pipeline::new(
            ReplayDetector::new(script),
            SafetyResolver::Exclusive(PriorityTable::driver()),
            MonitorState::new(10, dispatcher(link.clone())),
        );
        let mut source = FrameSource::spawn(Endless).unwrap();
        let running = AtomicBool::new(true);

        let processed = pipeline.run(&source, &running, Some(3));
        source.stop();

        assert_eq!(processed, 3);
        // 第二次手机告警仍在冷却窗口内
        assert_eq!(link.alerts().len(), 1);
        let state = pipeline.into_state();
        assert_eq!(state.dispatcher.stats().suppressed(), 1);
    }
}
