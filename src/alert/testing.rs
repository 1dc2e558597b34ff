//! 测试用内存通道

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

use super::{AlertEvent, HeartbeatAck, MonitorLink};
use crate::error::LinkError;

pub struct RecordingLink {
    accept: bool,
    delay: Duration,
    ack: HeartbeatAck,
    alerts: Mutex<Vec<AlertEvent>>,
    heartbeats: AtomicUsize,
}

impl RecordingLink {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            delay: Duration::ZERO,
            ack: HeartbeatAck {
                system_enabled: Some(true),
            },
            alerts: Mutex::new(Vec::new()),
            heartbeats: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            ..Self::accepting()
        }
    }

    pub fn blocking(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::accepting()
        }
    }

    pub fn with_ack(mut self, ack: HeartbeatAck) -> Self {
        self.ack = ack;
        self
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }
}

impl MonitorLink for RecordingLink {
    fn post_alert(&self, event: &AlertEvent) -> Result<(), LinkError> {
        thread::sleep(self.delay);
        self.alerts.lock().unwrap().push(event.clone());
        if self.accept {
            Ok(())
        } else {
            Err(LinkError::Status(503))
        }
    }

    fn heartbeat(&self, _entity_id: &str) -> Result<HeartbeatAck, LinkError> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        if self.accept {
            Ok(self.ack.clone())
        } else {
            Err(LinkError::Transport("connection refused".into()))
        }
    }

    fn status(&self, entity_id: &str) -> Result<Value, LinkError> {
        Ok(json!({ "driver_id": entity_id, "online": true }))
    }
}
