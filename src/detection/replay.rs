//! 回放检测器 (Replay detector)
//!
//! 每行一个 JSON 对象 `{"phone_use":0.3}`, 每处理一帧消费一行。
//! 脚本耗尽后返回空集合 (等同于安全帧)。

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{DetectionAdapter, DetectionSet};
use crate::input::Frame;

pub struct ReplayDetector {
    name: String,
    script: VecDeque<DetectionSet>,
    repeat: bool,
    played: Vec<DetectionSet>,
}

impl ReplayDetector {
    pub fn new(script: impl IntoIterator<Item = DetectionSet>) -> Self {
        Self {
            name: "replay".to_string(),
            script: script.into_iter().collect(),
            repeat: false,
            played: Vec::new(),
        }
    }

    /// 从 JSON-lines 文件加载 (空行和 `#` 注释行跳过)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("读取回放脚本失败: {}", path.display()))?;
        let mut script = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let set: DetectionSet = serde_json::from_str(line)
                .with_context(|| format!("{}:{} 不是合法的检测记录", path.display(), lineno + 1))?;
            script.push(set);
        }
        info!("📼 回放脚本已加载: {} ({}帧)", path.display(), script.len());
        let mut detector = Self::new(script);
        detector.name = format!("replay:{}", path.display());
        Ok(detector)
    }

    /// 脚本播放完后从头循环
    pub fn looping(mut self) -> Self {
        self.repeat = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DetectionAdapter for ReplayDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<DetectionSet> {
        if self.script.is_empty() && self.repeat && !self.played.is_empty() {
            self.script.extend(self.played.drain(..));
        }
        match self.script.pop_front() {
            Some(set) => {
                if self.repeat {
                    self.played.push(set.clone());
                }
                Ok(set)
            }
            None => Ok(DetectionSet::new()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
