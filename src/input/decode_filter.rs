/// FFmpeg解码过滤器: YUV420P帧 → RGB图像
/// FFmpeg decode filter: YUV420P frame → RgbImage
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, info, warn};

pub struct DecodeFilter {
    tx: Sender<RgbImage>,
    // 通道满时取出旧帧, 保证接收方拿到的总是最新帧
    stale: Receiver<RgbImage>,
    stop: Arc<AtomicBool>,
    count: usize,
    last: Instant,
    dropped_frames: usize,
    total_frames: usize,
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>, stale: Receiver<RgbImage>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stale,
            stop,
            count: 0,
            last: Instant::now(),
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: &str) -> Result<Option<Frame>, String> {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
        Ok(None)
    }

    fn deliver(&mut self, image: RgbImage) -> Result<(), String> {
        match self.tx.try_send(image) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(image)) => {
                let _ = self.stale.try_recv();
                let _ = self.tx.try_send(image);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err("Receiver dropped".to_string()),
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        // 传输层已释放, 返回错误让 FFmpeg 结束调度
        if self.stop.load(Ordering::Acquire) {
            debug!("🛑 解码器已释放, 停止解码");
            return Err("Decoder released".to_string());
        }

        self.total_frames += 1;

        let image = unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                return self.drop_frame("空帧/损坏帧");
            }

            let raw = &*frame.as_ptr();
            let w = raw.width as usize;
            let h = raw.height as usize;
            if w == 0 || h == 0 || w > 4096 || h > 4096 {
                return self.drop_frame(&format!("非法分辨率 {}x{}", w, h));
            }
            // 只丢弃严重错误的帧 (缺少参考帧、无效比特流)
            if raw.decode_error_flags & 0x03 != 0 {
                return self.drop_frame("解码错误标志");
            }

            let planes = [raw.data[0], raw.data[1], raw.data[2]];
            if planes.iter().any(|p| p.is_null()) {
                return self.drop_frame("YUV指针为空");
            }
            let y_stride = raw.linesize[0] as usize;
            let uv_stride = raw.linesize[1] as usize;
            if y_stride < w || uv_stride < w.div_ceil(2) {
                return self.drop_frame("步长异常");
            }

            let y = std::slice::from_raw_parts(planes[0], y_stride * h);
            let u = std::slice::from_raw_parts(planes[1], uv_stride * h.div_ceil(2));
            let v = std::slice::from_raw_parts(planes[2], uv_stride * h.div_ceil(2));
            yuv420p_to_rgb(y, u, v, y_stride, uv_stride, w, h)
        };

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let fps = self.count as f64 / self.last.elapsed().as_secs_f64();
            let drop_rate = self.dropped_frames as f64 / self.total_frames as f64 * 100.0;
            debug!(
                "📺 解码统计: {:.1}fps | 总帧{} | 丢弃{} ({:.1}%)",
                fps, self.total_frames, self.dropped_frames, drop_rate
            );
            self.last = Instant::now();
            self.count = 0;
        }

        if let Some(image) = image {
            self.deliver(image)?;
        }
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!("✅ 解码线程退出");
    }
}

/// BT.601 整数近似 (系数放大128倍)
fn yuv420p_to_rgb(
    y_plane: &[u8],
    u_plane: &[u8],
    v_plane: &[u8],
    y_stride: usize,
    uv_stride: usize,
    width: usize,
    height: usize,
) -> Option<RgbImage> {
    let mut buffer = vec![0u8; width * height * 3];
    let mut out_idx = 0;
    for row in 0..height {
        let y_row = row * y_stride;
        let uv_row = (row >> 1) * uv_stride;
        for x in 0..width {
            let y_val = y_plane[y_row + x] as i32;
            let u_val = u_plane[uv_row + (x >> 1)] as i32 - 128;
            let v_val = v_plane[uv_row + (x >> 1)] as i32 - 128;

            buffer[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
    RgbImage::from_raw(width as u32, height as u32, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grey_yuv_maps_to_grey_rgb() {
        let (w, h) = (4, 2);
        let y = vec![128u8; w * h];
        let u = vec![128u8; (w / 2) * (h / 2)];
        let v = vec![128u8; (w / 2) * (h / 2)];
        let img = yuv420p_to_rgb(&y, &u, &v, w, w / 2, w, h).unwrap();
        assert!(img.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn test_stride_padding_is_skipped() {
        let (w, h, stride) = (2, 2, 8);
        let mut y = vec![0u8; stride * h];
        y[0] = 255;
        let u = vec![128u8; stride];
        let v = vec![128u8; stride];
        let img = yuv420p_to_rgb(&y, &u, &v, stride, stride, w, h).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0]);
    }
}
