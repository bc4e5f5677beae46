//! 警告去抖服务 - 业务能力层
//!
//! 每个通道同时只显示一条警告，新的覆盖旧的（不排队），到期自动消失。
//! 时间由调用方传入，便于在会话循环里统一调度。

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

/// 警告通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WarningChannel {
    /// 人脸 / 姿态
    Proctoring,
    /// 切换标签页 / 窗口
    FocusLoss,
}

/// 一条临时警告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub expires_at: Instant,
}

/// 警告面板
#[derive(Debug, Clone)]
pub struct WarningBoard {
    clear_delay: Duration,
    warnings: BTreeMap<WarningChannel, Warning>,
}

impl WarningBoard {
    pub fn new(clear_delay: Duration) -> Self {
        Self {
            clear_delay,
            warnings: BTreeMap::new(),
        }
    }

    /// 显示警告并重新计时；同通道的旧警告和旧计时一并被替换
    pub fn show(&mut self, channel: WarningChannel, message: impl Into<String>, now: Instant) {
        let message = message.into();
        debug!("显示警告 {:?}: {}", channel, message);
        self.warnings.insert(
            channel,
            Warning {
                message,
                expires_at: now + self.clear_delay,
            },
        );
    }

    /// 保留当前内容，只重新开始自动消失计时
    pub fn clear_soon(&mut self, channel: WarningChannel, now: Instant) {
        if let Some(warning) = self.warnings.get_mut(&channel) {
            warning.expires_at = now + self.clear_delay;
        }
    }

    /// 立即清除
    pub fn dismiss(&mut self, channel: WarningChannel) {
        self.warnings.remove(&channel);
    }

    /// 清除所有警告及其计时（进入终止状态时调用）
    pub fn cancel_all(&mut self) {
        self.warnings.clear();
    }

    /// 移除所有已到期的警告，返回被移除的通道
    pub fn expire(&mut self, now: Instant) -> Vec<WarningChannel> {
        let expired: Vec<WarningChannel> = self
            .warnings
            .iter()
            .filter(|(_, w)| w.expires_at <= now)
            .map(|(channel, _)| *channel)
            .collect();
        for channel in &expired {
            self.warnings.remove(channel);
        }
        expired
    }

    /// 最近的一个到期时间
    pub fn next_deadline(&self) -> Option<Instant> {
        self.warnings.values().map(|w| w.expires_at).min()
    }

    pub fn get(&self, channel: WarningChannel) -> Option<&Warning> {
        self.warnings.get(&channel)
    }

    /// 当前显示中的警告
    pub fn active(&self) -> impl Iterator<Item = (WarningChannel, &Warning)> {
        self.warnings.iter().map(|(channel, w)| (*channel, w))
    }
}
