// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod alert; // 告警上报与心跳
pub mod config; // 部署配置
pub mod detection; // 检测适配层
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod pipeline; // 处理流水线
pub mod safety; // 安全判定与显示防抖
pub mod telemetry; // 车速遥测

pub use crate::alert::{AlertDispatcher, AlertEvent, HeartbeatService, HttpLink, MonitorLink};
pub use crate::config::{MonitorConfig, Preset};
pub use crate::detection::{DetectionAdapter, DetectionSet};
pub use crate::input::{Frame, FrameSource};
pub use crate::pipeline::{MonitorState, Pipeline};
pub use crate::safety::{SafetyResolver, SafetyVerdict, Severity};

/// 本地时间字符串 (快照文件名等)
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}
