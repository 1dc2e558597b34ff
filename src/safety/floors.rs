//! 置信度下限: 低于下限的标签视为本帧未检测到

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detection::DetectionSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFloors {
    pub default: f32,
    #[serde(default)]
    pub per_label: HashMap<String, f32>,
}

impl ConfidenceFloors {
    pub fn uniform(default: f32) -> Self {
        Self {
            default,
            per_label: HashMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>, floor: f32) -> Self {
        self.per_label.insert(label.into(), floor);
        self
    }

    pub fn floor(&self, label: &str) -> f32 {
        self.per_label.get(label).copied().unwrap_or(self.default)
    }

    pub fn admits(&self, label: &str, confidence: f32) -> bool {
        confidence >= self.floor(label)
    }

    /// 过滤后的集合, 只包含达到下限的标签
    pub fn apply(&self, detections: &DetectionSet) -> DetectionSet {
        let mut eligible = detections.clone();
        eligible.retain(|label, conf| self.admits(label, conf));
        eligible
    }
}

impl Default for ConfidenceFloors {
    fn default() -> Self {
        Self::uniform(0.25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_specific_floor() {
        let floors = ConfidenceFloors::uniform(0.25).with_label("phone_use", 0.15);
        assert!(floors.admits("phone_use", 0.15));
        assert!(!floors.admits("yawning", 0.2));
        assert!(floors.admits("yawning", 0.25));
    }

    #[test]
    fn test_apply_drops_low_confidence() {
        let floors = ConfidenceFloors::uniform(0.4);
        let set: DetectionSet = [("head", 0.39), ("hand", 0.8)].into_iter().collect();
        let eligible = floors.apply(&set);
        assert!(!eligible.contains("head"));
        assert!(eligible.contains("hand"));
    }
}
