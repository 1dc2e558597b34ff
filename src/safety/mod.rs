/// 安全判定系统 (Safety Decision System)
///
/// 检测集合 → 安全判定 → 显示状态
/// - ConfidenceFloors:  按标签的置信度下限
/// - SafetyResolver:    三种判定模式 (优先级互斥 / 独立检测 / 车速门控)
/// - HysteresisTracker: 本地显示防抖, 不影响告警发送
pub mod floors;
pub mod footboard;
pub mod hysteresis;
pub mod limbs;
pub mod priority;
pub mod resolver;

pub use floors::ConfidenceFloors;
pub use footboard::FootboardGate;
pub use hysteresis::{DisplayState, HysteresisTracker};
pub use limbs::{LimbCategory, LimbClassifier};
pub use priority::{PriorityRule, PriorityTable};
pub use resolver::{dominant, ResolverConfig, SafetyResolver};

use serde::{Deserialize, Serialize};

/// 风险等级 SAFE < WARNING < DANGER < CRITICAL
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Safe,
    Warning,
    Danger,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Warning => "WARNING",
            Self::Danger => "DANGER",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单帧安全判定
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub confidence: Option<f32>,
    pub detection_class: Option<String>,
    pub audible: bool,
    /// 防抖计数器增量 (WARNING 档为 0)
    pub weight: u32,
    /// 车速门控模式下的当前车速
    pub speed_kmh: Option<f32>,
}

impl SafetyVerdict {
    pub fn safe(message: impl Into<String>) -> Self {
        Self {
            alert_type: "safe".into(),
            severity: Severity::Safe,
            message: message.into(),
            confidence: None,
            detection_class: None,
            audible: false,
            weight: 0,
            speed_kmh: None,
        }
    }

    pub fn is_hazard(&self) -> bool {
        self.severity > Severity::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order_and_wire_names() {
        assert!(Severity::Safe < Severity::Warning);
        assert!(Severity::Warning < Severity::Danger);
        assert!(Severity::Danger < Severity::Critical);
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");
        let s: Severity = serde_json::from_str("\"WARNING\"").unwrap();
        assert_eq!(s, Severity::Warning);
    }

    #[test]
    fn test_safe_verdict_is_not_hazard() {
        assert!(!SafetyVerdict::safe("ok").is_hazard());
    }
}
