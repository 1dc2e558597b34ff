/// 视频输入系统 (Video Input System)
///
/// 独立采集线程, 只保留最新一帧 (丢帧语义)
/// - FrameTransport: 传输层接口 (读取一帧 / 释放连接)
/// - MjpegTransport: HTTP MJPEG 拉流 (手机IP摄像头)
/// - FfmpegTransport: RTSP/本地摄像头解码 (需要 `ffmpeg` 功能)
/// - FrameSlot:      最新帧槽位 (互斥锁 + 条件变量)
/// - FrameSource:    采集线程的启动与停止
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;
pub mod frame_slot;
pub mod mjpeg;
pub mod source;

#[cfg(feature = "ffmpeg")]
pub use decoder::FfmpegTransport;
pub use frame_slot::FrameSlot;
pub use mjpeg::MjpegTransport;
pub use source::{FrameSource, SourceStats};

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::error::TransportError;

/// 已解码帧 (采集线程 → 处理线程)
#[derive(Clone)]
pub struct Frame {
    seq: u64,
    captured_at: Instant,
    image: Arc<RgbImage>, // 使用Arc共享数据,避免复制
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self {
            seq,
            captured_at: Instant::now(),
            image: Arc::new(image),
        }
    }

    /// 纯黑帧 (测试与占位)
    pub fn blank(seq: u64, width: u32, height: u32) -> Self {
        Self::new(seq, RgbImage::new(width, height))
    }

    /// 采集序号 (单调递增)
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// 采集至今的时长
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("size", &format_args!("{}x{}", self.width(), self.height()))
            .finish()
    }
}

/// 视频传输层接口
///
/// `read` 可以阻塞, 但必须有上限 (超时), 否则停止信号无法及时生效。
/// `read` 返回 `Ok(None)` 表示暂时没有新帧。
pub trait FrameTransport: Send {
    fn read(&mut self) -> Result<Option<RgbImage>, TransportError>;

    /// 连接断开后重新建立连接
    fn reconnect(&mut self) -> Result<(), TransportError>;

    /// 释放底层连接, 采集循环退出后调用一次
    fn release(&mut self);

    fn describe(&self) -> String;
}

impl<T: FrameTransport + ?Sized> FrameTransport for Box<T> {
    fn read(&mut self) -> Result<Option<RgbImage>, TransportError> {
        (**self).read()
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        (**self).reconnect()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// 根据地址选择传输层: `http(s)://` → MJPEG, 其余 (rtsp/设备) → FFmpeg
pub fn open_transport(
    locator: &str,
    timeout: Duration,
) -> anyhow::Result<Box<dyn FrameTransport>> {
    let lower = locator.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        let transport = MjpegTransport::connect(locator, timeout)?;
        return Ok(Box::new(transport));
    }

    #[cfg(feature = "ffmpeg")]
    {
        let transport = FfmpegTransport::open(locator)?;
        Ok(Box::new(transport))
    }

    #[cfg(not(feature = "ffmpeg"))]
    {
        anyhow::bail!(
            "不支持的视频源: {} (RTSP/摄像头输入需要启用 `ffmpeg` 功能)",
            locator
        )
    }
}
