//! 车速门控判定 (踏板占用 × 行驶状态)

use serde::{Deserialize, Serialize};

use super::{ConfidenceFloors, SafetyVerdict, Severity};
use crate::detection::DetectionSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FootboardGate {
    pub floors: ConfidenceFloors,
    /// 出现任一标签即视为踏板有人
    pub occupancy_labels: Vec<String>,
    /// 超过该车速 (km/h) 视为行驶中
    pub moving_kmh: f32,
}

impl Default for FootboardGate {
    fn default() -> Self {
        Self {
            floors: ConfidenceFloors::uniform(0.25),
            occupancy_labels: vec!["Danger".into(), "Warning".into()],
            moving_kmh: 5.0,
        }
    }
}

impl FootboardGate {
    pub fn is_occupied(&self, eligible: &DetectionSet) -> bool {
        self.occupancy_labels.iter().any(|l| eligible.contains(l))
    }

    pub fn resolve(&self, detections: &DetectionSet, speed_kmh: f32) -> SafetyVerdict {
        let eligible = self.floors.apply(detections);
        let moving = speed_kmh > self.moving_kmh;

        if !self.is_occupied(&eligible) {
            let mut verdict = SafetyVerdict::safe(format!("Safe: Speed {:.1} km/h", speed_kmh));
            verdict.speed_kmh = Some(speed_kmh);
            return verdict;
        }

        // 告警类型取本帧置信度最高的标签
        let (label, confidence) = eligible
            .strongest()
            .map(|(l, c)| (l.to_string(), c))
            .unwrap_or_else(|| ("Safe".to_string(), 0.0));

        let (severity, message) = if moving {
            (
                Severity::Critical,
                format!("CRITICAL DANGER: BUS MOVING ({:.1} km/h)", speed_kmh),
            )
        } else {
            (
                Severity::Warning,
                "Warning: Footboard Occupied (Stationary)".to_string(),
            )
        };

        SafetyVerdict {
            detection_class: Some(label.clone()),
            alert_type: label,
            severity,
            message,
            confidence: Some(confidence),
            audible: moving,
            weight: if moving { 1 } else { 0 },
            speed_kmh: Some(speed_kmh),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied() -> DetectionSet {
        [("Warning", 0.4), ("Danger", 0.7)].into_iter().collect()
    }

    #[test]
    fn test_occupied_and_moving_is_critical() {
        let v = FootboardGate::default().resolve(&occupied(), 12.0);
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.alert_type, "Danger");
        assert_eq!(v.speed_kmh, Some(12.0));
        assert!(v.message.contains("12.0 km/h"));
        assert!(v.audible);
    }

    #[test]
    fn test_occupied_stationary_is_warning() {
        let v = FootboardGate::default().resolve(&occupied(), 5.0);
        assert_eq!(v.severity, Severity::Warning);
        assert!(!v.audible);
    }

    #[test]
    fn test_moving_without_occupancy_is_safe() {
        let set: DetectionSet = [("Danger", 0.1), ("person", 0.9)].into_iter().collect();
        let v = FootboardGate::default().resolve(&set, 40.0);
        assert_eq!(v.severity, Severity::Safe);
    }
}
