//! 事件處理器
//!
//! 事件名稱以 `on_` 開頭（例如 `on_connect`、`on_gmcp`、`on_room`）。
//! 與 Trigger 不同，同一事件的所有處理器都會依優先級執行。

use std::fmt;

use tracing::debug;

use super::{Rule, RuleRegistry};
use crate::action::{Action, ActionDispatcher};

/// 事件處理器
#[derive(Clone)]
pub struct EventHandler {
    pub name: String,
    /// 監聽的事件名稱
    pub event: String,
    pub priority: i32,
    pub enabled: bool,
    action: Action,
}

impl EventHandler {
    pub fn new(name: impl Into<String>, event: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            event: event.into(),
            priority: 0,
            enabled: true,
            action,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("name", &self.name)
            .field("event", &self.event)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Rule for EventHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// 事件處理器登錄表
pub type EventRegistry = RuleRegistry<EventHandler>;

impl RuleRegistry<EventHandler> {
    /// 觸發事件，回傳執行的處理器數量
    pub fn fire(&self, event: &str, args: &[String], dispatcher: &mut ActionDispatcher) -> usize {
        let mut count = 0;
        for handler in self.iter().filter(|h| h.enabled && h.event == event) {
            debug!("事件 '{}' -> 處理器 '{}'", event, handler.name);
            dispatcher.invoke_with_args(&handler.name, &handler.action, None, args);
            count += 1;
        }
        count
    }
}
