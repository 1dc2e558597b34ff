/// FFmpeg 拉流解码 (RTSP / 本地文件)
/// FFmpeg pulling decoder with software decoding only
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{error, info, warn};

use super::decode_filter::DecodeFilter;
use super::FrameTransport;
use crate::error::TransportError;

/// 单次读取的最长等待
const READ_TIMEOUT: Duration = Duration::from_secs(2);

pub struct FfmpegTransport {
    locator: String,
    rx: Receiver<RgbImage>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FfmpegTransport {
    pub fn open(locator: &str) -> Result<Self, TransportError> {
        let (rx, stop, handle) = spawn_decoder(locator)?;
        Ok(Self {
            locator: locator.to_string(),
            rx,
            stop,
            handle: Some(handle),
        })
    }

    fn shutdown_decoder(&mut self) {
        self.stop.store(true, Ordering::Release);
        // 解码线程可能阻塞在网络读取上, 不在此处 join; 下一帧到达时自行退出
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() && handle.join().is_err() {
                error!("❌ 解码线程异常退出: {}", self.locator);
            }
        }
    }
}

impl FrameTransport for FfmpegTransport {
    fn read(&mut self) -> Result<Option<RgbImage>, TransportError> {
        match self.rx.recv_timeout(READ_TIMEOUT) {
            Ok(image) => Ok(Some(image)),
            Err(RecvTimeoutError::Timeout) => {
                Err(TransportError::Unavailable("等待解码帧超时".into()))
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.shutdown_decoder();
        let (rx, stop, handle) = spawn_decoder(&self.locator)?;
        self.rx = rx;
        self.stop = stop;
        self.handle = Some(handle);
        Ok(())
    }

    fn release(&mut self) {
        self.shutdown_decoder();
    }

    fn describe(&self) -> String {
        format!("ffmpeg:{}", self.locator)
    }
}

impl Drop for FfmpegTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn spawn_decoder(
    locator: &str,
) -> Result<(Receiver<RgbImage>, Arc<AtomicBool>, JoinHandle<()>), TransportError> {
    let (tx, rx) = bounded(1);
    let stop = Arc::new(AtomicBool::new(false));
    let filter = DecodeFilter::new(tx, rx.clone(), stop.clone());
    let url = locator.to_string();

    let handle = thread::Builder::new()
        .name("ffmpeg-decoder".into())
        .spawn(move || {
            info!("🎬 FFmpeg解码器启动: {}", url);
            match software_decode(&url, filter) {
                Ok(()) => info!("✅ 解码线程正常退出"),
                Err(e) => warn!("❌ CPU软件解码失败: {}", e),
            }
        })?;
    Ok((rx, stop, handle))
}

/// CPU软件解码, 阻塞直到流结束或过滤器返回错误
fn software_decode(url: &str, filter: DecodeFilter) -> Result<(), String> {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let mut input = Input::new(url);
    if url.starts_with("rtsp://") {
        input = input.set_input_opts(
            [
                ("rtsp_transport", "tcp"),
                ("buffer_size", "67108864"),
                ("rtsp_flags", "prefer_tcp"),
            ]
            .into(),
        );
    }

    let ctx = FfmpegContext::builder()
        .input(input)
        .filter_descs(["format=yuv420p"].into())
        .output(out)
        .build()
        .map_err(|e| format!("构建失败: {}", e))?;

    let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
    info!("✅ CPU软件解码启动成功");
    let _ = sch.wait();
    Ok(())
}
