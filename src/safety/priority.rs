/// 优先级互斥判定 (驾驶员状态)
/// Exclusive-priority resolution: first matching rule wins
use serde::{Deserialize, Serialize};

use super::{ConfidenceFloors, SafetyVerdict, Severity};
use crate::detection::DetectionSet;

fn default_weight() -> u32 {
    1
}

/// 单条规则: 任一触发标签出现即命中
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriorityRule {
    pub alert_type: String,
    pub labels: Vec<String>,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub detection_class: Option<String>,
    #[serde(default)]
    pub audible: bool,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl PriorityRule {
    pub fn new(alert_type: &str, labels: &[&str], severity: Severity, message: &str) -> Self {
        Self {
            alert_type: alert_type.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            severity,
            message: message.into(),
            detection_class: None,
            audible: false,
            weight: if severity > Severity::Warning { 1 } else { 0 },
        }
    }

    pub fn class(mut self, detection_class: &str) -> Self {
        self.detection_class = Some(detection_class.into());
        self
    }

    pub fn audible(mut self) -> Self {
        self.audible = true;
        self
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// 命中时返回匹配标签中的最高置信度
    fn matches(&self, eligible: &DetectionSet) -> Option<f32> {
        self.labels
            .iter()
            .filter_map(|l| eligible.confidence(l))
            .reduce(f32::max)
    }

    fn verdict(&self, confidence: f32) -> SafetyVerdict {
        SafetyVerdict {
            alert_type: self.alert_type.clone(),
            severity: self.severity,
            message: self.message.clone(),
            confidence: Some(confidence),
            detection_class: self.detection_class.clone(),
            audible: self.audible,
            weight: self.weight,
            speed_kmh: None,
        }
    }
}

/// 有序规则表, 自上而下求值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriorityTable {
    pub floors: ConfidenceFloors,
    pub rules: Vec<PriorityRule>,
    #[serde(default = "PriorityTable::default_safe_message")]
    pub safe_message: String,
}

impl PriorityTable {
    fn default_safe_message() -> String {
        "Driver alert".into()
    }

    /// 驾驶员监控规则表
    pub fn driver() -> Self {
        Self {
            floors: ConfidenceFloors::uniform(0.25).with_label("phone_use", 0.15),
            rules: vec![
                PriorityRule::new(
                    "drowsy",
                    &["Drowsy", "eyes closed"],
                    Severity::Critical,
                    "Driver appears drowsy! Wake up immediately!",
                )
                .class("Drowsy/Eyes Closed")
                .audible()
                .weight(2),
                PriorityRule::new(
                    "phone_use",
                    &["phone_use"],
                    Severity::Danger,
                    "Phone usage detected! Put the phone down!",
                )
                .class("Phone Use")
                .audible(),
                PriorityRule::new(
                    "looking_away",
                    &["looking_away"],
                    Severity::Danger,
                    "Driver looking away from road! Eyes on road!",
                )
                .class("Looking Away")
                .audible(),
                PriorityRule::new(
                    "yawning",
                    &["yawning"],
                    Severity::Warning,
                    "Driver yawning detected. Consider taking a break!",
                )
                .class("Yawning"),
                PriorityRule::new(
                    "eyes_narrowed",
                    &["eyes_narrowed"],
                    Severity::Warning,
                    "Driver eyes narrowing - signs of fatigue detected.",
                )
                .class("Eyes Narrowed"),
            ],
            safe_message: Self::default_safe_message(),
        }
    }

    /// 恰好返回一个判定; 无规则命中时为 SAFE
    pub fn resolve(&self, detections: &DetectionSet) -> SafetyVerdict {
        let eligible = self.floors.apply(detections);
        self.rules
            .iter()
            .find_map(|rule| rule.matches(&eligible).map(|conf| rule.verdict(conf)))
            .unwrap_or_else(|| SafetyVerdict::safe(self.safe_message.clone()))
    }
}
