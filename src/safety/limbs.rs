/// 独立检测判定 (车窗安全)
/// 每个检测独立产生一个判定, 互不短路
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{ConfidenceFloors, SafetyVerdict, Severity};
use crate::detection::DetectionSet;

/// 肢体类别 (封闭集合, 未识别标签原样保留)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimbCategory {
    Head,
    Hand,
    Body,
    Unrecognized(String),
}

impl LimbCategory {
    /// 关键字分类 (标签表未覆盖时使用)
    pub fn from_keyword(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("head") {
            Self::Head
        } else if lower.contains("hand") {
            Self::Hand
        } else if lower.contains("body") {
            Self::Body
        } else {
            Self::Unrecognized(label.to_string())
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Head => Severity::Danger,
            Self::Hand | Self::Body | Self::Unrecognized(_) => Severity::Warning,
        }
    }

    pub fn alert_type(&self) -> &'static str {
        match self {
            Self::Head => "head_detected",
            Self::Hand => "hand_detected",
            Self::Body => "body_detected",
            Self::Unrecognized(_) => "unknown_detected",
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Head => "Head detected outside window!".into(),
            Self::Hand => "Hand detected outside window!".into(),
            Self::Body => "Body detected outside window!".into(),
            Self::Unrecognized(label) => format!("{} detected!", label),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LimbClassifier {
    pub floors: ConfidenceFloors,
    /// 标签 → 类别 的显式映射
    #[serde(default)]
    pub labels: HashMap<String, LimbCategory>,
}

impl LimbClassifier {
    pub fn window() -> Self {
        Self {
            floors: ConfidenceFloors::uniform(0.4),
            labels: HashMap::new(),
        }
    }

    pub fn classify(&self, label: &str) -> LimbCategory {
        self.labels
            .get(label)
            .cloned()
            .unwrap_or_else(|| LimbCategory::from_keyword(label))
    }

    /// 按置信度降序, 每个合格检测一个判定
    pub fn resolve(&self, detections: &DetectionSet) -> Vec<SafetyVerdict> {
        let eligible = self.floors.apply(detections);
        eligible
            .sorted()
            .into_iter()
            .map(|(label, conf)| {
                let category = self.classify(label);
                let severity = category.severity();
                SafetyVerdict {
                    alert_type: category.alert_type().into(),
                    severity,
                    message: format!("{} Confidence: {:.2}%", category.describe(), conf * 100.0),
                    confidence: Some(conf),
                    detection_class: Some(label.to_string()),
                    audible: severity > Severity::Warning,
                    weight: if severity > Severity::Warning { 1 } else { 0 },
                    speed_kmh: None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_and_hand_yield_two_verdicts() {
        let set: DetectionSet = [("left_hand", 0.8), ("head_out", 0.9)].into_iter().collect();
        let verdicts = LimbClassifier::window().resolve(&set);
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].severity, Severity::Danger);
        assert_eq!(verdicts[0].alert_type, "head_detected");
        assert_eq!(verdicts[1].severity, Severity::Warning);
        assert_eq!(verdicts[1].alert_type, "hand_detected");
        assert!(verdicts[0].message.contains("90.00%"));
    }

    #[test]
    fn test_unrecognized_keeps_raw_label() {
        let c = LimbClassifier::window();
        assert_eq!(c.classify("Elbow"), LimbCategory::Unrecognized("Elbow".into()));
        let set: DetectionSet = [("Elbow", 0.5)].into_iter().collect();
        let v = &c.resolve(&set)[0];
        assert_eq!(v.alert_type, "unknown_detected");
        assert!(v.message.starts_with("Elbow detected!"));
    }

    #[test]
    fn test_explicit_table_overrides_keywords() {
        let mut c = LimbClassifier::window();
        c.labels.insert("arm".into(), LimbCategory::Hand);
        c.labels.insert("handbag".into(), LimbCategory::Unrecognized("handbag".into()));
        assert_eq!(c.classify("arm"), LimbCategory::Hand);
        assert_eq!(c.classify("HEAD"), LimbCategory::Head);
        assert_eq!(c.classify("handbag"), LimbCategory::Unrecognized("handbag".into()));
    }

    #[test]
    fn test_floor_filters_limbs() {
        let set: DetectionSet = [("head", 0.39)].into_iter().collect();
        assert!(LimbClassifier::window().resolve(&set).is_empty());
    }
}
