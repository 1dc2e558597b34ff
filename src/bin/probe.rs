/// 监控服务连通性测试
/// 依次发送心跳、查询状态、发送一条 WARNING 测试告警
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use safety_sentinel::alert::{AlertEvent, HttpLink, MonitorLink};
use safety_sentinel::config::{MonitorConfig, Preset};
use safety_sentinel::safety::Severity;

#[derive(Parser, Debug)]
#[command(author, version, about = "监控服务连通性测试", long_about = None)]
struct Args {
    /// 配置文件 (不存在时按预设创建)
    #[arg(short, long, default_value = "sentinel.json")]
    config: String,

    #[arg(short, long, value_enum, default_value_t = Preset::Driver)]
    preset: Preset,

    /// 监控服务地址 (覆盖配置文件)
    #[arg(long)]
    server: Option<String>,

    #[arg(long)]
    entity_id: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = match MonitorConfig::load_or_init(&args.config, args.preset) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(server) = args.server {
        cfg.server_url = server;
    }
    if let Some(id) = args.entity_id {
        cfg.entity_id = id;
    }

    println!("🔍 测试服务器连接: {}", cfg.server_url);
    println!("   监控对象: {}\n", cfg.entity_id);
    let link = HttpLink::new(&cfg.server_url, cfg.request_timeout());
    let mut failures = 0;

    // 1. 心跳
    match link.heartbeat(&cfg.entity_id) {
        Ok(ack) => {
            let state = match ack.system_enabled {
                Some(true) => "enabled",
                Some(false) => "disabled",
                None => "unknown",
            };
            println!("✅ 心跳成功 - System {}", state);
        }
        Err(e) => {
            failures += 1;
            println!("❌ 心跳失败: {}", e);
        }
    }

    // 2. 状态查询
    match link.status(&cfg.entity_id) {
        Ok(status) => println!("✅ 状态查询成功: {}", status),
        Err(e) => {
            failures += 1;
            println!("❌ 状态查询失败: {}", e);
        }
    }

    // 3. 测试告警
    let event = AlertEvent {
        entity_id: cfg.entity_id.clone(),
        alert_type: "test_alert".into(),
        severity: Severity::Warning,
        message: format!(
            "Connection test alert ({})",
            safety_sentinel::gen_time_string(":")
        ),
        confidence: Some(0.99),
        detection_class: None,
        speed: None,
        status: None,
        audible: false,
        timestamp: Utc::now(),
    };
    match link.post_alert(&event) {
        Ok(()) => println!("✅ 测试告警已创建"),
        Err(e) => {
            failures += 1;
            println!("❌ 测试告警失败: {}", e);
        }
    }

    if failures == 0 {
        println!("\n🎉 服务器连接正常");
        ExitCode::SUCCESS
    } else {
        println!("\n⚠️ {} 项测试失败", failures);
        ExitCode::FAILURE
    }
}
