/// 安全判定器 (按部署选择模式)
/// SafetyResolver: one per deployment, modes are not merged
use serde::{Deserialize, Serialize};

use super::{FootboardGate, LimbClassifier, PriorityTable, SafetyVerdict};
use crate::detection::DetectionSet;
use crate::telemetry::SpeedGauge;

/// 判定模式配置 (JSON 中以 `mode` 字段区分)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResolverConfig {
    ExclusivePriority(PriorityTable),
    IndependentDetections(LimbClassifier),
    SpeedGated(FootboardGate),
}

impl ResolverConfig {
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::ExclusivePriority(_) => "exclusive_priority",
            Self::IndependentDetections(_) => "independent_detections",
            Self::SpeedGated(_) => "speed_gated",
        }
    }
}

pub enum SafetyResolver {
    Exclusive(PriorityTable),
    Independent(LimbClassifier),
    SpeedGated { gate: FootboardGate, speed: SpeedGauge },
}

impl SafetyResolver {
    /// 车速门控模式从 `speed` 读取车速, 其余模式忽略该参数
    pub fn from_config(config: &ResolverConfig, speed: SpeedGauge) -> Self {
        match config {
            ResolverConfig::ExclusivePriority(table) => Self::Exclusive(table.clone()),
            ResolverConfig::IndependentDetections(c) => Self::Independent(c.clone()),
            ResolverConfig::SpeedGated(gate) => Self::SpeedGated {
                gate: gate.clone(),
                speed,
            },
        }
    }

    /// 互斥/门控模式恰好返回一个判定 (可能为 SAFE); 独立模式返回 0..N 个
    pub fn resolve(&self, detections: &DetectionSet) -> Vec<SafetyVerdict> {
        match self {
            Self::Exclusive(table) => vec![table.resolve(detections)],
            Self::Independent(classifier) => classifier.resolve(detections),
            Self::SpeedGated { gate, speed } => vec![gate.resolve(detections, speed.kmh())],
        }
    }
}

/// 最严重的危险判定 (用于本地显示)
pub fn dominant(verdicts: &[SafetyVerdict]) -> Option<&SafetyVerdict> {
    verdicts
        .iter()
        .filter(|v| v.is_hazard())
        .max_by_key(|v| v.severity)
}
