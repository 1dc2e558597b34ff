/// 告警上报系统 (Alert Reporting System)
///
/// - AlertEvent:      告警报文
/// - MonitorLink:     远程服务接口 (HttpLink 为 ureq 实现)
/// - CooldownTracker: 按 (alert_type, severity) 去重限流
/// - AlertDispatcher: 冷却 + 内联/后台发送
/// - HeartbeatService: 独立心跳线程
pub mod cooldown;
pub mod dispatcher;
pub mod event;
pub mod heartbeat;
pub mod link;
#[cfg(test)]
pub(crate) mod testing;

pub use cooldown::{CooldownKey, CooldownTracker};
pub use dispatcher::{
    AlertDispatcher, CooldownPolicy, DeliveryMode, Dispatch, DispatchStats, DispatcherConfig,
};
pub use event::AlertEvent;
pub use heartbeat::HeartbeatService;
pub use link::{HeartbeatAck, HttpLink, MonitorLink};
