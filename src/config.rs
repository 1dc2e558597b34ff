//! 部署配置 - 通过JSON文件调整参数
//!
//! 文件不存在时写入所选预设并继续运行; 文件存在但解析失败直接报错退出,
//! 安全配置错误不能静默回退到默认值。

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alert::{CooldownPolicy, DeliveryMode, DispatcherConfig};
use crate::safety::{FootboardGate, LimbClassifier, PriorityTable, ResolverConfig};

/// 部署预设
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// 驾驶员状态监控 (优先级互斥)
    Driver,
    /// 车窗肢体检测 (独立检测)
    Window,
    /// 踏板占用 × 车速 (车速门控)
    Footboard,
}

/// 检测模型参数 (`onnx` 功能使用)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub labels: Vec<String>,
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

/// 手机传感器接口 (踏板部署)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// 状态快照输出
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub path: String,
    #[serde(default = "default_snapshot_every")]
    pub every_n_frames: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_snapshot_every() -> u64 {
    30
}

fn default_heartbeat_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_queue_capacity() -> usize {
    32
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    // === 身份与服务端 ===
    pub entity_id: String,
    pub server_url: String,
    pub stream_url: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    // === 告警 ===
    pub cooldown_secs: f64,
    #[serde(default)]
    pub cooldown_policy: CooldownPolicy,
    #[serde(default)]
    pub delivery: DeliveryMode,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    // === 判定与显示 ===
    pub display_threshold: u32,
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub sensor: Option<SensorConfig>,
    #[serde(default)]
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub snapshot: Option<SnapshotConfig>,
}

const PHONE_HOST: &str = "http://192.168.1.100:8080";
const SERVER_HOST: &str = "http://localhost:5000";

impl MonitorConfig {
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Driver => Self::driver(),
            Preset::Window => Self::window(),
            Preset::Footboard => Self::footboard(),
        }
    }

    fn base(server_path: &str, cooldown_secs: f64, display_threshold: u32, resolver: ResolverConfig) -> Self {
        Self {
            entity_id: "driver-001".into(),
            server_url: format!("{}{}", SERVER_HOST, server_path),
            stream_url: format!("{}/video", PHONE_HOST),
            heartbeat_interval_secs: default_heartbeat_secs(),
            request_timeout_secs: default_timeout_secs(),
            cooldown_secs,
            cooldown_policy: CooldownPolicy::default(),
            delivery: DeliveryMode::default(),
            queue_capacity: default_queue_capacity(),
            display_threshold,
            resolver,
            sensor: None,
            model: None,
            snapshot: None,
        }
    }

    pub fn driver() -> Self {
        let mut cfg = Self::base(
            "/api/driver-monitor",
            5.0,
            10,
            ResolverConfig::ExclusivePriority(PriorityTable::driver()),
        );
        cfg.model = Some(ModelConfig {
            path: "driver_monitor.onnx".into(),
            labels: labels(&["Drowsy", "eyes closed", "eyes_narrowed", "looking_away", "phone_use", "yawning"]),
            input_size: 320,
            conf_threshold: 0.15,
            iou_threshold: 0.5,
            max_detections: 5,
        });
        cfg
    }

    pub fn window() -> Self {
        let mut cfg = Self::base(
            "/api/window-safety",
            5.0,
            1,
            ResolverConfig::IndependentDetections(LimbClassifier::window()),
        );
        cfg.model = Some(ModelConfig {
            path: "window_safety.onnx".into(),
            labels: labels(&["body", "hand", "head"]),
            input_size: 320,
            conf_threshold: 0.4,
            iou_threshold: 0.45,
            max_detections: 20,
        });
        cfg
    }

    pub fn footboard() -> Self {
        let mut cfg = Self::base(
            "/api/safety",
            2.0,
            1,
            ResolverConfig::SpeedGated(FootboardGate::default()),
        );
        cfg.request_timeout_secs = 2;
        cfg.sensor = Some(SensorConfig {
            url: format!("{}/sensors.json", PHONE_HOST),
            poll_interval_ms: default_poll_interval_ms(),
        });
        cfg.model = Some(ModelConfig {
            path: "footboard.onnx".into(),
            labels: labels(&["Danger", "Safe", "Warning"]),
            input_size: 480,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 20,
        });
        cfg
    }

    /// 从JSON文件加载配置; 文件不存在时写入预设
    pub fn load_or_init(path: impl AsRef<Path>, preset: Preset) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("📝 配置文件不存在, 使用预设 {:?} 并写入 {}", preset, path.display());
            let config = Self::preset(preset);
            if let Err(e) = config.save(path) {
                warn!("⚠️ 保存默认配置失败: {:#}", e);
            }
            return Ok(config);
        }

        let json = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("配置文件解析失败: {}", path.display()))?;
        config.validate()?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("写入配置失败: {}", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.entity_id.trim().is_empty() {
            bail!("entity_id 不能为空");
        }
        if !self.cooldown_secs.is_finite() || self.cooldown_secs < 0.0 {
            bail!("cooldown_secs 非法: {}", self.cooldown_secs);
        }
        if self.display_threshold == 0 {
            bail!("display_threshold 必须 >= 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity 必须 >= 1");
        }
        if matches!(self.resolver, ResolverConfig::SpeedGated(_)) && self.sensor.is_none() {
            bail!("speed_gated 模式需要配置 sensor.url");
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            entity_id: self.entity_id.clone(),
            cooldown: self.cooldown(),
            policy: self.cooldown_policy,
            delivery: self.delivery,
            queue_capacity: self.queue_capacity,
        }
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️ 当前配置:");
        info!("  监控对象: {}", self.entity_id);
        info!("  服务端: {}", self.server_url);
        info!("  视频源: {}", self.stream_url);
        info!("  判定模式: {}", self.resolver.mode_name());
        info!(
            "  冷却: {:.1}s ({:?}, {:?}) | 显示阈值: {}",
            self.cooldown_secs, self.cooldown_policy, self.delivery, self.display_threshold
        );
        if let Some(sensor) = &self.sensor {
            info!("  传感器: {} (每{}ms)", sensor.url, sensor.poll_interval_ms);
        }
    }
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
