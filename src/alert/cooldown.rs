//! 告警冷却: 同一 (alert_type, severity) 在冷却窗口内只放行一次

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::safety::{SafetyVerdict, Severity};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub alert_type: String,
    pub severity: Severity,
}

impl CooldownKey {
    pub fn of(verdict: &SafetyVerdict) -> Self {
        Self {
            alert_type: verdict.alert_type.clone(),
            severity: verdict.severity,
        }
    }
}

impl std::fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.alert_type, self.severity)
    }
}

#[derive(Debug)]
pub struct CooldownTracker {
    window: Duration,
    last_attempt: HashMap<CooldownKey, Instant>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_attempt: HashMap::new(),
        }
    }

    /// 冷却中返回 false 且不修改任何状态; 否则记录 `now` 并放行
    pub fn try_acquire(&mut self, key: &CooldownKey, now: Instant) -> bool {
        if self.remaining(key, now).is_some() {
            return false;
        }
        self.last_attempt.insert(key.clone(), now);
        true
    }

    /// 剩余冷却时间
    pub fn remaining(&self, key: &CooldownKey, now: Instant) -> Option<Duration> {
        let last = self.last_attempt.get(key)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < self.window).then(|| self.window - elapsed)
    }

    /// 仅当记录的时间仍是 `attempted_at` 时撤销 (之后的新尝试不受影响)
    pub fn release_if(&mut self, key: &CooldownKey, attempted_at: Instant) -> bool {
        if self.last_attempt.get(key) == Some(&attempted_at) {
            self.last_attempt.remove(key);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.last_attempt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_attempt.is_empty()
    }
}
