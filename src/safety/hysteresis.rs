//! 显示防抖 (Hysteresis)
//!
//! 危险帧按规则权重累加, 安全帧减 1 (不低于 0), WARNING 帧保持不变。
//! 计数器只影响本地显示, 与告警发送无关。

use super::{SafetyVerdict, Severity};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayState {
    Clear,
    /// WARNING 档判定, 绕过计数器立即显示
    Warning,
    /// 计数器达到阈值
    Escalated,
}

#[derive(Debug, Clone)]
pub struct HysteresisTracker {
    counter: u32,
    threshold: u32,
}

impl HysteresisTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            counter: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// 每帧调用一次; `None` 或 SAFE 判定视为安全帧
    pub fn update(&mut self, verdict: Option<&SafetyVerdict>) -> DisplayState {
        let severity = verdict.map_or(Severity::Safe, |v| v.severity);
        match severity {
            Severity::Safe => self.counter = self.counter.saturating_sub(1),
            Severity::Warning => {}
            Severity::Danger | Severity::Critical => {
                let weight = verdict.map_or(1, |v| v.weight);
                self.counter = self.counter.saturating_add(weight);
            }
        }

        if self.counter >= self.threshold {
            DisplayState::Escalated
        } else if severity == Severity::Warning {
            DisplayState::Warning
        } else {
            DisplayState::Clear
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hazard(weight: u32) -> SafetyVerdict {
        SafetyVerdict {
            alert_type: "drowsy".into(),
            severity: Severity::Critical,
            message: String::new(),
            confidence: Some(0.9),
            detection_class: None,
            audible: true,
            weight,
            speed_kmh: None,
        }
    }

    #[test]
    fn test_counter_never_negative() {
        let mut h = HysteresisTracker::new(10);
        for _ in 0..5 {
            assert_eq!(h.update(None), DisplayState::Clear);
        }
        assert_eq!(h.counter(), 0);
    }

    #[test]
    fn test_five_weighted_frames_escalate() {
        let mut h = HysteresisTracker::new(10);
        let v = hazard(2);
        let states: Vec<_> = (0..5).map(|_| h.update(Some(&v))).collect();
        assert!(h.counter() >= 10);
        assert_eq!(states[4], DisplayState::Escalated);
        assert_eq!(states[3], DisplayState::Clear);
    }

    #[test]
    fn test_one_hazard_one_safe_nets_plus_one() {
        let mut h = HysteresisTracker::new(10);
        h.update(Some(&hazard(2)));
        h.update(Some(&SafetyVerdict::safe("ok")));
        assert_eq!(h.counter(), 1);
    }

    #[test]
    fn test_warning_bypasses_counter() {
        let mut h = HysteresisTracker::new(10);
        h.update(Some(&hazard(1)));
        let mut warn = hazard(0);
        warn.severity = Severity::Warning;
        assert_eq!(h.update(Some(&warn)), DisplayState::Warning);
        assert_eq!(h.counter(), 1);
    }

    #[test]
    fn test_escalation_holds_through_single_safe_frame() {
        let mut h = HysteresisTracker::new(4);
        for _ in 0..3 {
            h.update(Some(&hazard(2)));
        }
        assert_eq!(h.update(None), DisplayState::Escalated);
        assert_eq!(h.counter(), 5);
    }
}
