/// 安全哨兵 (Safety Sentinel)
///
/// 检测 → 告警 安全监控
///
/// 系统架构:
/// 1. 采集线程: 视频拉流解码, 只保留最新一帧
/// 2. 心跳线程: 定时上报在线状态
/// 3. 主线程:   检测 → 判定 → 防抖 → 告警分发 (后台发送线程)
/// 4. 车速线程: 踏板部署时轮询手机GPS
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use safety_sentinel::alert::{AlertDispatcher, HeartbeatService, HttpLink, MonitorLink};
use safety_sentinel::config::{MonitorConfig, Preset, SnapshotConfig};
use safety_sentinel::detection::{DetectionAdapter, ReplayDetector};
use safety_sentinel::input::FrameSource;
use safety_sentinel::pipeline::{LogStatusSink, MonitorState, Pipeline, SnapshotSink};
use safety_sentinel::safety::{ResolverConfig, SafetyResolver};
use safety_sentinel::telemetry::{SpeedGauge, SpeedPoller};

/// 安全哨兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "安全哨兵 - 检测到告警的安全监控", long_about = None)]
struct Args {
    /// 配置文件 (不存在时按预设创建)
    #[arg(short, long, default_value = "sentinel.json")]
    config: String,

    /// 部署预设
    #[arg(short, long, value_enum, default_value_t = Preset::Driver)]
    preset: Preset,

    /// 视频源地址 (http://.../video 或 rtsp://...)
    #[arg(short, long)]
    stream: Option<String>,

    /// 监控服务地址, 如 http://localhost:5000/api/driver-monitor
    #[arg(long)]
    server: Option<String>,

    /// 被监控对象 (司机) ID
    #[arg(long)]
    entity_id: Option<String>,

    /// ONNX 模型路径
    #[arg(short, long)]
    model: Option<String>,

    /// 模型类别标签, 逗号分隔
    #[arg(long, value_delimiter = ',')]
    labels: Option<Vec<String>>,

    /// 回放检测脚本 (JSON-lines), 代替模型
    #[arg(long)]
    replay: Option<String>,

    /// 回放脚本结束后循环
    #[arg(long, default_value_t = false)]
    replay_loop: bool,

    /// 状态快照输出路径 (JPEG)
    #[arg(long)]
    snapshot: Option<String>,

    /// 处理指定帧数后退出
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("safety_sentinel=info,sentinel=info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let mut cfg = MonitorConfig::load_or_init(&args.config, args.preset)?;

    if let Some(stream) = &args.stream {
        cfg.stream_url = stream.clone();
    }
    if let Some(server) = &args.server {
        cfg.server_url = server.clone();
    }
    if let Some(id) = &args.entity_id {
        cfg.entity_id = id.clone();
    }
    if args.model.is_some() || args.labels.is_some() {
        let mut model = cfg
            .model
            .clone()
            .or_else(|| MonitorConfig::preset(args.preset).model)
            .context("预设没有模型参数")?;
        if let Some(path) = &args.model {
            model.path = path.clone();
        }
        if let Some(labels) = &args.labels {
            model.labels = labels.clone();
        }
        cfg.model = Some(model);
    }
    if let Some(path) = &args.snapshot {
        cfg.snapshot = Some(SnapshotConfig {
            path: path.clone(),
            every_n_frames: cfg.snapshot.as_ref().map_or(30, |s| s.every_n_frames),
        });
    }

    cfg.validate()?;
    Ok(cfg)
}

/// 检测器加载失败直接退出: 没有检测器, 任何安全功能都无法运行
fn build_detector(args: &Args, cfg: &MonitorConfig) -> Result<Box<dyn DetectionAdapter>> {
    if let Some(path) = &args.replay {
        let mut replay = ReplayDetector::from_file(path)?;
        if args.replay_loop {
            replay = replay.looping();
        }
        return Ok(Box::new(replay));
    }

    match &cfg.model {
        #[cfg(feature = "onnx")]
        Some(model) => Ok(Box::new(safety_sentinel::detection::YoloDetector::new(model)?)),
        #[cfg(not(feature = "onnx"))]
        Some(model) => bail!(
            "模型 {} 需要启用 `onnx` 功能编译, 或使用 --replay 回放脚本",
            model.path
        ),
        None => bail!("未配置检测模型, 请在配置中设置 model 或使用 --replay"),
    }
}

fn run(args: Args) -> Result<()> {
    info!("🚀 安全哨兵启动");
    let cfg = load_config(&args)?;
    cfg.log_summary();

    let detector = build_detector(&args, &cfg).context("检测器初始化失败")?;
    info!("📦 检测器: {}", detector.name());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("🛑 收到退出信号, 正在停止...");
            running.store(false, Ordering::Release);
        })
        .context("注册 Ctrl+C 处理失败")?;
    }

    let link: Arc<dyn MonitorLink> = Arc::new(HttpLink::new(&cfg.server_url, cfg.request_timeout()));

    // ========== 启动车速线程 (仅踏板部署) ==========
    let speed = SpeedGauge::new();
    let mut poller = match (&cfg.resolver, &cfg.sensor) {
        (ResolverConfig::SpeedGated(_), Some(sensor)) => Some(SpeedPoller::start(
            &sensor.url,
            Duration::from_millis(sensor.poll_interval_ms.max(50)),
            speed.clone(),
        )?),
        _ => None,
    };

    // ========== 启动心跳线程 ==========
    let mut heartbeat = HeartbeatService::start(link.clone(), &cfg.entity_id, cfg.heartbeat_interval())?;

    // ========== 启动采集线程 ==========
    let mut source = FrameSource::start(&cfg.stream_url, cfg.request_timeout())?;

    // ========== 主线程: 处理循环 ==========
    let dispatcher = AlertDispatcher::new(cfg.dispatcher_config(), link)?;
    let resolver = SafetyResolver::from_config(&cfg.resolver, speed);
    let mut pipeline = Pipeline::new(
        detector,
        resolver,
        MonitorState::new(cfg.display_threshold, dispatcher),
    )
    .with_sink(LogStatusSink::new());
    if let Some(snapshot) = &cfg.snapshot {
        info!("📸 状态快照: {} (每{}帧)", snapshot.path, snapshot.every_n_frames);
        pipeline = pipeline.with_sink(SnapshotSink::new(&snapshot.path, snapshot.every_n_frames));
    }

    info!("✅ 系统就绪, 开始监控...");
    let started = Instant::now();
    let processed = pipeline.run(&source, &running, args.max_frames);

    // 先停采集, 再排空告警队列, 最后停心跳
    source.stop();
    let state = pipeline.into_state();
    heartbeat.stop();
    if let Some(poller) = poller.as_mut() {
        poller.stop();
    }

    let stats = state.dispatcher.stats();
    info!(
        "✅ 安全哨兵已停止 | 运行{:.0}s | 处理{}帧 | 告警 发送{} 冷却{} 失败{} 丢弃{} | 心跳 成功{} 失败{}",
        started.elapsed().as_secs_f64(),
        processed,
        stats.sent(),
        stats.suppressed(),
        stats.failed(),
        stats.dropped(),
        heartbeat.sent(),
        heartbeat.failed()
    );
    Ok(())
}
