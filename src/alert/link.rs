/// 远程监控服务接口
/// Remote monitoring service endpoint
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AlertEvent;
use crate::error::LinkError;

/// 心跳应答
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    #[serde(default)]
    pub system_enabled: Option<bool>,
}

#[derive(Serialize)]
struct HeartbeatBody<'a> {
    driver_id: &'a str,
}

/// 告警/心跳发送通道; 测试中用内存实现替换
pub trait MonitorLink: Send + Sync {
    /// 服务端返回 201 时成功
    fn post_alert(&self, event: &AlertEvent) -> Result<(), LinkError>;

    /// 服务端返回 200 时成功
    fn heartbeat(&self, entity_id: &str) -> Result<HeartbeatAck, LinkError>;

    fn status(&self, entity_id: &str) -> Result<Value, LinkError>;
}

/// HTTP 实现 (ureq, 每个请求带超时)
pub struct HttpLink {
    base: String,
    agent: ureq::Agent,
}

impl HttpLink {
    pub fn new(server_url: &str, timeout: Duration) -> Self {
        Self {
            base: server_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }
}

impl MonitorLink for HttpLink {
    fn post_alert(&self, event: &AlertEvent) -> Result<(), LinkError> {
        let resp = self
            .agent
            .post(&format!("{}/alerts", self.base))
            .send_json(event)?;
        match resp.status() {
            201 => Ok(()),
            code => Err(LinkError::Status(code)),
        }
    }

    fn heartbeat(&self, entity_id: &str) -> Result<HeartbeatAck, LinkError> {
        let resp = self
            .agent
            .post(&format!("{}/heartbeat", self.base))
            .send_json(HeartbeatBody { driver_id: entity_id })?;
        if resp.status() != 200 {
            return Err(LinkError::Status(resp.status()));
        }
        // 应答体不是 JSON 时仍视为心跳成功
        Ok(resp.into_json::<HeartbeatAck>().unwrap_or_default())
    }

    fn status(&self, entity_id: &str) -> Result<Value, LinkError> {
        let resp = self
            .agent
            .get(&format!("{}/status", self.base))
            .query("driver_id", entity_id)
            .call()?;
        Ok(resp.into_json::<Value>()?)
    }
}
