//! 状态输出 (本地显示), 只读取判定结果, 不反馈到处理流程

use std::path::PathBuf;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tracing::{info, warn};

use super::FrameReport;
use crate::input::Frame;
use crate::safety::DisplayState;

pub trait StatusSink {
    fn on_frame(&mut self, frame: Option<&Frame>, report: &FrameReport);
}

/// 显示状态变化时输出日志
#[derive(Debug, Default)]
pub struct LogStatusSink {
    last: Option<DisplayState>,
}

impl LogStatusSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusSink for LogStatusSink {
    fn on_frame(&mut self, _frame: Option<&Frame>, report: &FrameReport) {
        if self.last == Some(report.display) {
            return;
        }
        self.last = Some(report.display);
        let message = report.headline().map(|v| v.message.as_str()).unwrap_or("");
        match report.display {
            DisplayState::Escalated => warn!(
                "🔴 {} (计数器{}/{})",
                message, report.counter, report.threshold
            ),
            DisplayState::Warning => warn!("🟠 {}", message),
            DisplayState::Clear => info!("🟢 状态正常"),
        }
        if !report.detections.is_empty() {
            info!("   检测: {}", report.detections.summary());
        }
    }
}

const BAR_HEIGHT: u32 = 24;
const METER_HEIGHT: u32 = 6;

/// 每 N 帧把带状态栏的画面写成 JPEG
pub struct SnapshotSink {
    path: PathBuf,
    every: u64,
    frames: u64,
}

impl SnapshotSink {
    pub fn new(path: impl Into<PathBuf>, every_n_frames: u64) -> Self {
        Self {
            path: path.into(),
            every: every_n_frames.max(1),
            frames: 0,
        }
    }
}

fn status_color(display: DisplayState) -> Rgb<u8> {
    match display {
        DisplayState::Clear => Rgb([0, 200, 0]),
        DisplayState::Warning => Rgb([255, 165, 0]),
        DisplayState::Escalated => Rgb([220, 0, 0]),
    }
}

/// 顶部状态栏 + 计数器进度条
pub fn annotate(image: &RgbImage, report: &FrameReport) -> RgbImage {
    let mut canvas = image.clone();
    let width = canvas.width();
    if width == 0 || canvas.height() == 0 {
        return canvas;
    }

    let bar = BAR_HEIGHT.min(canvas.height());
    draw_filled_rect_mut(
        &mut canvas,
        Rect::at(0, 0).of_size(width, bar),
        status_color(report.display),
    );

    if canvas.height() > bar + METER_HEIGHT {
        let ratio = (report.counter as f32 / report.threshold.max(1) as f32).min(1.0);
        let filled = (width as f32 * ratio) as u32;
        if filled > 0 {
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(0, bar as i32).of_size(filled, METER_HEIGHT),
                Rgb([255, 255, 255]),
            );
        }
    }
    canvas
}

impl StatusSink for SnapshotSink {
    fn on_frame(&mut self, frame: Option<&Frame>, report: &FrameReport) {
        let Some(frame) = frame else {
            return;
        };
        self.frames += 1;
        if self.frames % self.every != 0 {
            return;
        }
        let canvas = annotate(frame.image(), report);
        if let Err(e) = canvas.save(&self.path) {
            warn!("⚠️ 快照保存失败 {}: {}", self.path.display(), e);
        }
    }
}
