/// 检测数据结构定义
/// Data structures for per-frame detections
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 单个检测结果 (标签 + 置信度)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32, // 0.0 ~ 1.0
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// 单帧检测集合: 标签 → 置信度
///
/// 同一标签只保留一个置信度 (取最高值), 决策只关心每类是否出现。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionSet {
    labels: HashMap<String, f32>,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, detection: Detection) {
        let conf = detection.confidence.clamp(0.0, 1.0);
        self.labels
            .entry(detection.label)
            .and_modify(|c| *c = c.max(conf))
            .or_insert(conf);
    }

    pub fn confidence(&self, label: &str) -> Option<f32> {
        self.labels.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// 按置信度降序排列 (置信度相同按标签排序, 保证输出稳定)
    pub fn sorted(&self) -> Vec<(&str, f32)> {
        let mut items: Vec<_> = self.iter().collect();
        items.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        items
    }

    /// 置信度最高的检测
    pub fn strongest(&self) -> Option<(&str, f32)> {
        self.sorted().into_iter().next()
    }

    /// 保留满足条件的检测
    pub fn retain(&mut self, mut keep: impl FnMut(&str, f32) -> bool) {
        self.labels.retain(|k, v| keep(k, *v));
    }

    /// 概要字符串, 如 "phone_use: 30% | yawning: 55%"
    pub fn summary(&self) -> String {
        self.sorted()
            .iter()
            .map(|(k, v)| format!("{}: {}%", k, (v * 100.0) as u32))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        let mut set = Self::new();
        for d in iter {
            set.insert(d);
        }
        set
    }
}

impl<'a> FromIterator<(&'a str, f32)> for DetectionSet {
    fn from_iter<I: IntoIterator<Item = (&'a str, f32)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(label, conf)| Detection::new(label, conf))
            .collect()
    }
}
