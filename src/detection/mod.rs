/// 检测系统 (Detection System)
///
/// 外部检测模型的适配层: 输入一帧, 输出该帧的标签/置信度集合
/// - ReplayDetector: 按行回放预先录制的检测结果 (演练/测试)
/// - YoloDetector:   YOLOv8 ONNX 模型 (需要 `onnx` 功能)
pub mod replay;
pub mod types;
#[cfg(feature = "onnx")]
pub mod yolov8;

pub use replay::ReplayDetector;
pub use types::{Detection, DetectionSet};
#[cfg(feature = "onnx")]
pub use yolov8::YoloDetector;

use crate::input::Frame;

/// 检测适配器接口
///
/// 每处理一帧同步调用一次; 延迟与准确率由适配器自己负责。
pub trait DetectionAdapter: Send {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<DetectionSet>;

    /// 模型名称 (日志用)
    fn name(&self) -> &str;
}

impl<D: DetectionAdapter + ?Sized> DetectionAdapter for Box<D> {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<DetectionSet> {
        (**self).detect(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
