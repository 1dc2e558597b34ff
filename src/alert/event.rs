use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::safety::{SafetyVerdict, Severity};

/// 告警报文 (每次发送时新建, 客户端不保存历史)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "driver_id")]
    pub entity_id: String,
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    /// 车速门控部署的服务端读取 `status` 字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Severity>,
    #[serde(rename = "sound", default)]
    pub audible: bool,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn from_verdict(entity_id: &str, verdict: &SafetyVerdict, timestamp: DateTime<Utc>) -> Self {
        let speed = verdict.speed_kmh.map(|s| (s * 100.0).round() / 100.0);
        Self {
            entity_id: entity_id.to_string(),
            alert_type: verdict.alert_type.clone(),
            severity: verdict.severity,
            message: verdict.message.clone(),
            confidence: verdict.confidence,
            detection_class: verdict.detection_class.clone(),
            speed,
            status: speed.map(|_| verdict.severity),
            audible: verdict.audible,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::PriorityTable;

    #[test]
    fn test_wire_field_names() {
        let set = [("phone_use", 0.3)].into_iter().collect();
        let verdict = PriorityTable::driver().resolve(&set);
        let event = AlertEvent::from_verdict("bus-7", &verdict, Utc::now());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["driver_id"], "bus-7");
        assert_eq!(json["alert_type"], "phone_use");
        assert_eq!(json["severity"], "DANGER");
        assert_eq!(json["sound"], true);
        assert_eq!(json["detection_class"], "Phone Use");
        assert!(json.get("speed").is_none());
        assert!(json.get("status").is_none());
        assert!(json["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_speed_gated_event_carries_status() {
        let mut verdict = SafetyVerdict::safe("x");
        verdict.severity = Severity::Critical;
        verdict.speed_kmh = Some(12.3456);
        let event = AlertEvent::from_verdict("bus-7", &verdict, Utc::now());
        assert_eq!(event.speed, Some(12.35));
        assert_eq!(event.status, Some(Severity::Critical));
    }
}
