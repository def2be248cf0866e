//! Timer（計時器）模組
//!
//! 由 [`TimerScheduler::tick`] 驅動，呼叫端提供目前時間。
//! 每個計時器在一次 tick 中最多觸發一次，觸發後從當下重新排程。

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{Rule, RuleRegistry};
use crate::action::{Action, ActionDispatcher};

/// 計時器定義
#[derive(Clone)]
pub struct Timer {
    pub name: String,
    /// 觸發間隔，為零時不會排程
    pub interval: Duration,
    pub priority: i32,
    pub enabled: bool,
    action: Action,
}

impl Timer {
    pub fn new(name: impl Into<String>, interval: Duration, action: Action) -> Self {
        Self {
            name: name.into(),
            interval,
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

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Rule for Timer {
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

/// 計時器排程器
#[derive(Debug, Default)]
pub struct TimerScheduler {
    timers: RuleRegistry<Timer>,
    due: HashMap<String, Instant>,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以新的計時器集合取代目前排程
    pub fn load(&mut self, timers: impl IntoIterator<Item = Timer>, now: Instant) {
        let mut registry = RuleRegistry::new();
        registry.load(timers.into_iter().filter(schedulable));

        self.due = registry
            .iter()
            .map(|t| (t.name.clone(), now + t.interval))
            .collect();
        self.timers = registry;
    }

    /// 加入或更新計時器，第一次觸發時間為 `now + interval`
    pub fn register(&mut self, timer: Timer, now: Instant) {
        self.remove(&timer.name);
        if !schedulable(&timer) {
            return;
        }

        if timer.enabled {
            self.due.insert(timer.name.clone(), now + timer.interval);
        }
        self.timers.register(timer);
    }

    /// 移除計時器，之後的 tick 不會再觸發
    pub fn remove(&mut self, name: &str) -> bool {
        self.due.remove(name);
        self.timers.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.timers.contains(name)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// 下一次觸發時間
    pub fn next_due(&self) -> Option<Instant> {
        self.due.values().min().copied()
    }

    /// 觸發所有到期的計時器，回傳觸發數量
    pub fn tick(&mut self, now: Instant, dispatcher: &mut ActionDispatcher) -> usize {
        let mut fired = 0;

        for timer in self.timers.iter() {
            let Some(due) = self.due.get_mut(&timer.name) else {
                continue;
            };
            if *due > now {
                continue;
            }

            debug!("計時器 '{}' 觸發", timer.name);
            dispatcher.invoke(&timer.name, &timer.action, None);
            *due = now + timer.interval;
            fired += 1;
        }

        fired
    }
}

fn schedulable(timer: &Timer) -> bool {
    if timer.interval.is_zero() {
        debug!("計時器 '{}' 間隔為零，不排程", timer.name);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{action_fn, Effect};

    fn send(text: &'static str) -> Action {
        action_fn(move |_, ctx| {
            ctx.send(text);
            Ok(())
        })
    }

    #[test]
    fn test_fires_after_interval() {
        let start = Instant::now();
        let mut scheduler = TimerScheduler::new();
        let mut dispatcher = ActionDispatcher::new();
        scheduler.register(Timer::new("save", Duration::from_secs(10), send("save")), start);

        assert_eq!(scheduler.tick(start + Duration::from_secs(5), &mut dispatcher), 0);
        assert_eq!(scheduler.tick(start + Duration::from_secs(10), &mut dispatcher), 1);
        assert_eq!(dispatcher.take_effects(), vec![Effect::Send("save".to_string())]);

        // 從觸發時間重新排程
        assert_eq!(scheduler.tick(start + Duration::from_secs(15), &mut dispatcher), 0);
        assert_eq!(scheduler.tick(start + Duration::from_secs(20), &mut dispatcher), 1);
    }

    #[test]
    fn test_fires_once_per_tick_when_late() {
        let start = Instant::now();
        let mut scheduler = TimerScheduler::new();
        let mut dispatcher = ActionDispatcher::new();
        scheduler.register(Timer::new("ping", Duration::from_secs(1), send("ping")), start);

        assert_eq!(scheduler.tick(start + Duration::from_secs(60), &mut dispatcher), 1);
        assert_eq!(dispatcher.take_effects().len(), 1);
    }

    #[test]
    fn test_zero_interval_not_scheduled() {
        let start = Instant::now();
        let mut scheduler = TimerScheduler::new();
        scheduler.register(Timer::new("zero", Duration::ZERO, send("x")), start);

        assert!(scheduler.is_empty());
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn test_removed_timer_never_fires() {
        let start = Instant::now();
        let mut scheduler = TimerScheduler::new();
        let mut dispatcher = ActionDispatcher::new();
        scheduler.register(Timer::new("t", Duration::from_secs(1), send("x")), start);

        assert!(scheduler.remove("t"));
        assert_eq!(scheduler.tick(start + Duration::from_secs(5), &mut dispatcher), 0);
    }

    #[test]
    fn test_disabled_timer_never_fires() {
        let start = Instant::now();
        let mut scheduler = TimerScheduler::new();
        let mut dispatcher = ActionDispatcher::new();
        scheduler.register(Timer::new("t", Duration::from_secs(1), send("x")), start);
        scheduler.register(
            Timer::new("t", Duration::from_secs(1), send("x")).with_enabled(false),
            start,
        );

        assert_eq!(scheduler.tick(start + Duration::from_secs(5), &mut dispatcher), 0);
    }

    #[test]
    fn test_load_replaces_schedule() {
        let start = Instant::now();
        let mut scheduler = TimerScheduler::new();
        scheduler.register(Timer::new("old", Duration::from_secs(1), send("old")), start);

        scheduler.load(
            vec![
                Timer::new("a", Duration::from_secs(3), send("a")),
                Timer::new("b", Duration::from_secs(2), send("b")).with_priority(1),
            ],
            start,
        );

        assert!(!scheduler.contains("old"));
        assert_eq!(scheduler.next_due(), Some(start + Duration::from_secs(2)));

        let mut dispatcher = ActionDispatcher::new();
        assert_eq!(scheduler.tick(start + Duration::from_secs(3), &mut dispatcher), 2);
        assert_eq!(
            dispatcher.take_effects(),
            vec![
                Effect::Send("b".to_string()),
                Effect::Send("a".to_string()),
            ]
        );
    }
}
