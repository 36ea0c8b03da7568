//! 终端更新总线
//!
//! ```text
//! Scheduler / Registry ──▶ UpdateBus::notify() ──▶ broadcast::Sender<TerminalUpdate>
//!                                                    │
//!                                    ┌───────────────┼───────────────┐
//!                                    ▼               ▼               ▼
//!                               展示层订阅者      测试订阅者        ...
//! ```
//!
//! 没有订阅者时消息直接丢弃；master 不等待展示层。

use shared::message::{TerminalUpdate, UpdateEvent};
use tokio::sync::broadcast;

/// Default capacity of the broadcast channel
const DEFAULT_CAPACITY: usize = 1024;

/// 终端更新总线
#[derive(Debug, Clone)]
pub struct UpdateBus {
    tx: broadcast::Sender<TerminalUpdate>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 订阅所有终端的更新
    pub fn subscribe(&self) -> broadcast::Receiver<TerminalUpdate> {
        self.tx.subscribe()
    }

    /// 发布一条更新，返回收到的订阅者数量
    pub fn publish(&self, update: TerminalUpdate) -> usize {
        tracing::trace!(terminal = update.terminal, event = %update.event, "Terminal update");
        self.tx.send(update).unwrap_or(0)
    }

    pub fn notify(&self, terminal: u32, event: UpdateEvent) -> usize {
        self.publish(TerminalUpdate::new(terminal, event))
    }

    pub fn notify_with(&self, terminal: u32, event: UpdateEvent, value: impl Into<String>) -> usize {
        self.publish(TerminalUpdate::new(terminal, event).with_value(value))
    }
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = UpdateBus::new();
        assert_eq!(bus.notify(1, UpdateEvent::Blink), 0);
    }

    #[test]
    fn test_subscriber_receives_value() {
        let bus = UpdateBus::new();
        let mut rx = bus.subscribe();
        bus.notify_with(2, UpdateEvent::MealPeriod, "Lunch");
        let update = rx.try_recv().unwrap();
        assert_eq!(update.terminal, 2);
        assert_eq!(update.event, UpdateEvent::MealPeriod);
        assert_eq!(update.value.as_deref(), Some("Lunch"));
    }
}
