// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 ONNX 检测适配器
// 包含: 模型加载、预处理、推理、后处理 (输出标签/置信度集合)

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use tracing::{debug, info};

use super::{Detection, DetectionAdapter, DetectionSet};
use crate::config::ModelConfig;
use crate::input::Frame;

const CXYWH_OFFSET: usize = 4;

/// 检测框 (推理分辨率坐标)
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    class_id: usize,
    confidence: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        let inter = (r - l).max(0.0) * (b - t).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// YOLOv8 检测器
pub struct YoloDetector {
    session: Session,
    name: String,
    labels: Vec<String>,
    input_size: u32,
    conf: f32,
    iou: f32,
    max_det: usize,
}

impl YoloDetector {
    /// 加载模型 (失败即启动失败)
    pub fn new(config: &ModelConfig) -> Result<Self> {
        if config.labels.is_empty() {
            bail!("模型 {} 未配置类别标签 (labels)", config.path);
        }
        info!("📦 加载检测模型: {}", config.path);
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&config.path)
            .with_context(|| format!("模型加载失败: {}", config.path))?;
        info!(
            "✅ 模型加载成功 | 输入{}x{} | 类别{}个 | conf={:.2} iou={:.2}",
            config.input_size,
            config.input_size,
            config.labels.len(),
            config.conf_threshold,
            config.iou_threshold
        );

        Ok(Self {
            session,
            name: config.path.clone(),
            labels: config.labels.clone(),
            input_size: config.input_size,
            conf: config.conf_threshold,
            iou: config.iou_threshold,
            max_det: config.max_detections,
        })
    }

    /// 等比缩放到左上角, 其余区域填充灰色 (与训练时一致)
    fn preprocess(&self, img: &DynamicImage) -> (Array4<f32>, f32) {
        let size = self.input_size;
        let (w0, h0) = img.dimensions();
        let ratio = (size as f32 / w0 as f32).min(size as f32 / h0 as f32);
        let w1 = ((w0 as f32 * ratio).round() as u32).clamp(1, size);
        let h1 = ((h0 as f32 * ratio).round() as u32).clamp(1, size);
        let resized = img.resize_exact(w1, h1, FilterType::Triangle).to_rgb8();

        let mut input = Array4::from_elem((1, 3, size as usize, size as usize), 144.0 / 255.0);
        for (x, y, rgb) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            input[[0, 0, y, x]] = r as f32 / 255.0;
            input[[0, 1, y, x]] = g as f32 / 255.0;
            input[[0, 2, y, x]] = b as f32 / 255.0;
        }
        (input, ratio)
    }

    /// 输出形状 [1, 4 + nc, anchors]
    fn postprocess(&self, shape: &[i64], data: &[f32], ratio: f32) -> Result<Vec<Candidate>> {
        if shape.len() != 3 {
            bail!("非预期的输出形状: {:?}", shape);
        }
        let channels = shape[1] as usize;
        let anchors = shape[2] as usize;
        let nc = channels.saturating_sub(CXYWH_OFFSET);
        if nc == 0 || data.len() < channels * anchors {
            bail!("输出数据长度不匹配: shape={:?} len={}", shape, data.len());
        }

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let (class_id, confidence) = (0..nc)
                .map(|c| (c, data[(CXYWH_OFFSET + c) * anchors + i]))
                .reduce(|max, x| if x.1 > max.1 { x } else { max })
                .unwrap_or((0, 0.0));
            if confidence < self.conf {
                continue;
            }
            let cx = data[i] / ratio;
            let cy = data[anchors + i] / ratio;
            let w = data[2 * anchors + i] / ratio;
            let h = data[3 * anchors + i] / ratio;
            candidates.push(Candidate {
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
                class_id,
                confidence,
            });
        }

        Ok(non_max_suppression(candidates, self.iou, self.max_det))
    }
}

/// 按置信度降序的贪心 NMS, 只在同类别框之间抑制
fn non_max_suppression(mut xs: Vec<Candidate>, iou_threshold: f32, max_det: usize) -> Vec<Candidate> {
    xs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    for x in xs {
        if kept.len() >= max_det {
            break;
        }
        if kept
            .iter()
            .filter(|k| k.class_id == x.class_id)
            .all(|k| k.iou(&x) <= iou_threshold)
        {
            kept.push(x);
        }
    }
    kept
}

impl DetectionAdapter for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionSet> {
        let img = DynamicImage::ImageRgb8(frame.image().clone());
        let (input, ratio) = self.preprocess(&img);

        let size = self.input_size as usize;
        let shape = [1, 3, size, size];
        let (data, _) = input.into_raw_vec_and_offset();
        let tensor = Value::from_array((shape.as_slice(), data.into_boxed_slice()))?;
        let outputs = self.session.run(ort::inputs!["images" => tensor])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let shape: Vec<i64> = shape.iter().copied().collect();
        let candidates = self.postprocess(&shape, data, ratio)?;

        let set: DetectionSet = candidates
            .iter()
            .filter_map(|c| {
                self.labels
                    .get(c.class_id)
                    .map(|label| Detection::new(label.clone(), c.confidence))
            })
            .collect();
        debug!("🔍 帧#{} 检测: {}", frame.seq(), set.summary());
        Ok(set)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
