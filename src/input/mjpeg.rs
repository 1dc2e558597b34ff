/// HTTP MJPEG 拉流 (手机IP摄像头 `/video`)
/// HTTP MJPEG pulling transport
///
/// `multipart/x-mixed-replace` 流按 JPEG 起止标记切帧;
/// 单张 `image/jpeg` 地址 (如 `/shot.jpg`) 每次读取重新请求一次。
use std::io::{ErrorKind, Read};
use std::time::Duration;

use image::{ImageFormat, RgbImage};
use tracing::{debug, info, warn};

use crate::error::TransportError;

use super::FrameTransport;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const HEADER_END: &[u8] = b"\r\n\r\n";
const CHUNK_SIZE: usize = 16 * 1024;
/// 超过该长度仍未找到完整帧则丢弃缓冲
const MAX_BUFFER: usize = 8 * 1024 * 1024;

enum Mode {
    Stream(Box<dyn Read + Send + Sync>),
    Snapshot,
    Closed,
}

pub struct MjpegTransport {
    url: String,
    agent: ureq::Agent,
    mode: Mode,
    buffer: Vec<u8>,
}

impl MjpegTransport {
    /// 建立连接 (连接/读取超时均为 `timeout`)
    ///
    /// 首次连接失败不算错误: 采集循环会按退避策略重连。
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        let mut transport = Self {
            url: url.to_string(),
            agent,
            mode: Mode::Closed,
            buffer: Vec::with_capacity(CHUNK_SIZE * 8),
        };
        if let Err(e) = transport.open() {
            warn!("⚠️ 视频源暂不可用: {} ({}), 稍后重连", url, e);
        }
        Ok(transport)
    }

    fn open(&mut self) -> Result<(), TransportError> {
        let resp = self.agent.get(&self.url).call()?;
        let content_type = resp.content_type().to_ascii_lowercase();
        self.buffer.clear();
        if content_type.starts_with("multipart/") {
            info!("📹 MJPEG 流已连接: {} ({})", self.url, content_type);
            self.mode = Mode::Stream(resp.into_reader());
        } else {
            info!("📷 快照模式: {} ({})", self.url, content_type);
            self.mode = Mode::Snapshot;
        }
        Ok(())
    }

    fn read_stream(&mut self) -> Result<Option<RgbImage>, TransportError> {
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            if let Some(jpeg) = take_jpeg(&mut self.buffer) {
                return decode_jpeg(&jpeg).map(Some);
            }
            if self.buffer.len() > MAX_BUFFER {
                self.buffer.clear();
                return Err(TransportError::Decode("未找到完整JPEG帧".into()));
            }

            let Mode::Stream(reader) = &mut self.mode else {
                return Err(TransportError::Closed);
            };
            let n = match reader.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Err(TransportError::Unavailable("读取超时".into()));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn read_snapshot(&mut self) -> Result<Option<RgbImage>, TransportError> {
        let resp = self.agent.get(&self.url).call()?;
        let mut bytes = Vec::new();
        resp.into_reader()
            .take(MAX_BUFFER as u64)
            .read_to_end(&mut bytes)?;
        decode_jpeg(&bytes).map(Some)
    }
}

impl FrameTransport for MjpegTransport {
    fn read(&mut self) -> Result<Option<RgbImage>, TransportError> {
        match self.mode {
            Mode::Stream(_) => self.read_stream(),
            Mode::Snapshot => self.read_snapshot(),
            Mode::Closed => Err(TransportError::Closed),
        }
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.mode = Mode::Closed;
        self.open()
    }

    fn release(&mut self) {
        self.mode = Mode::Closed;
        self.buffer.clear();
        debug!("🔌 MJPEG 连接已释放: {}", self.url);
    }

    fn describe(&self) -> String {
        format!("mjpeg:{}", self.url)
    }
}

/// 从缓冲中取出第一帧完整 JPEG
///
/// 分段头带 `Content-Length` 时按长度切帧 (帧内可含 EXIF 缩略图的起止标记),
/// 否则按 SOI/EOI 切帧。帧之前的数据 (multipart 边界/头部) 一并丢弃。
fn take_jpeg(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let lead = buffer
        .iter()
        .take_while(|b| matches!(b, b'\r' | b'\n'))
        .count();
    buffer.drain(..lead);

    let soi = find(buffer, &SOI, 0);
    if let Some(header_end) = find(buffer, HEADER_END, 0) {
        if soi.map_or(true, |soi| header_end < soi) {
            if let Some(len) = content_length(&buffer[..header_end]) {
                let start = header_end + HEADER_END.len();
                if buffer.len() < start + len {
                    return None;
                }
                let jpeg = buffer[start..start + len].to_vec();
                buffer.drain(..start + len);
                return Some(jpeg);
            }
        }
    }

    let start = soi?;
    let end = find(buffer, &EOI, start + 2)? + 2;
    let jpeg = buffer[start..end].to_vec();
    buffer.drain(..end);
    Some(jpeg)
}

fn content_length(headers: &[u8]) -> Option<usize> {
    String::from_utf8_lossy(headers)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .filter(|&len| len > 0 && len <= MAX_BUFFER)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < from + needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage, TransportError> {
    image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map(|img| img.to_rgb8())
        .map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;

    fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, image::Rgb([200, 10, 10]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&img)
            .unwrap();
        out
    }

    #[test]
    fn test_take_jpeg_strips_multipart_headers() {
        let frame = jpeg_bytes(8, 6);
        let mut buffer = b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        buffer.extend_from_slice(&frame);
        buffer.extend_from_slice(b"\r\n--boundary\r\n");

        let jpeg = take_jpeg(&mut buffer).unwrap();
        assert_eq!(jpeg, frame);
        assert_eq!(buffer, b"\r\n--boundary\r\n".to_vec());

        let img = decode_jpeg(&jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (8, 6));
    }

    /// 在 SOI 之后插入一个带嵌套 SOI/EOI 的 APP1 段 (模拟 EXIF 缩略图)
    fn jpeg_with_thumbnail() -> Vec<u8> {
        let frame = jpeg_bytes(8, 8);
        let payload: Vec<u8> = [&b"Exif\0\0"[..], &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9][..]].concat();
        let seg_len = (payload.len() + 2) as u16;
        let mut out = frame[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&seg_len.to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&frame[2..]);
        out
    }

    #[test]
    fn test_take_jpeg_uses_content_length() {
        let frame = jpeg_with_thumbnail();
        let mut buffer = format!(
            "--boundary\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.len()
        )
        .into_bytes();
        buffer.extend_from_slice(&frame);
        buffer.extend_from_slice(b"\r\n--boundary\r\n");

        let jpeg = take_jpeg(&mut buffer).unwrap();
        assert_eq!(jpeg, frame);
        assert_eq!(buffer, b"\r\n--boundary\r\n".to_vec());
    }

    #[test]
    fn test_take_jpeg_content_length_waits_for_body() {
        let frame = jpeg_with_thumbnail();
        let header = format!("--b\r\nContent-Length: {}\r\n\r\n", frame.len());
        let mut buffer = header.into_bytes();
        buffer.extend_from_slice(&frame[..frame.len() - 4]);
        assert!(take_jpeg(&mut buffer).is_none());

        buffer.extend_from_slice(&frame[frame.len() - 4..]);
        assert_eq!(take_jpeg(&mut buffer).unwrap(), frame);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_take_jpeg_waits_for_complete_frame() {
        let frame = jpeg_bytes(8, 8);
        let mut buffer = frame[..frame.len() / 2].to_vec();
        assert!(take_jpeg(&mut buffer).is_none());
        buffer.extend_from_slice(&frame[frame.len() / 2..]);
        assert!(take_jpeg(&mut buffer).is_some());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unreachable_source_defers_to_reconnect() {
        let mut t =
            MjpegTransport::connect("http://127.0.0.1:9/video", Duration::from_millis(200)).unwrap();
        assert!(matches!(t.read(), Err(TransportError::Closed)));
        assert!(t.reconnect().is_err());
        assert_eq!(t.describe(), "mjpeg:http://127.0.0.1:9/video");
    }

    #[test]
    fn test_decode_garbage_is_transient() {
        let err = decode_jpeg(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]).unwrap_err();
        assert!(err.is_transient());
    }
}
