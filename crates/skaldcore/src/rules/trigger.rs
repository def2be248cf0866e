//! Trigger（觸發器）模組
//!
//! 對伺服器送來的每一行文字進行匹配，第一個匹配的觸發器勝出

use std::fmt;

use regex::Regex;
use tracing::debug;

use super::{compile_pattern, PatternError, Rule, RuleMatch, RuleRegistry};
use crate::action::{Action, ActionDispatcher};

/// 觸發器登錄表
pub type TriggerRegistry = RuleRegistry<Trigger>;

/// 觸發器定義
#[derive(Clone)]
pub struct Trigger {
    /// 觸發器名稱
    pub name: String,
    /// 優先級（越大越先匹配）
    pub priority: i32,
    /// 是否啟用
    pub enabled: bool,
    /// 匹配後是否抑制該行顯示
    pub gag: bool,
    regex: Regex,
    action: Action,
}

impl Trigger {
    /// 創建新的觸發器，匹配模式無效時返回錯誤
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        action: Action,
    ) -> Result<Self, PatternError> {
        let name = name.into();
        let regex = compile_pattern(&name, pattern)?;
        Ok(Self {
            name,
            priority: 0,
            enabled: true,
            gag: false,
            regex,
            action,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_gag(mut self, gag: bool) -> Self {
        self.gag = gag;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// 在整行中搜尋匹配（不要求從行首開始）
    pub fn try_match(&self, line: &str) -> Option<RuleMatch> {
        let captures = self.regex.captures(line)?;
        Some(RuleMatch::from_captures(&self.regex, &captures))
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("pattern", &self.regex.as_str())
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("gag", &self.gag)
            .finish_non_exhaustive()
    }
}

impl Rule for Trigger {
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

/// 觸發器處理結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerOutcome {
    /// 匹配的觸發器名稱
    pub fired: Option<String>,
    /// 是否抑制該行
    pub gag: bool,
}

impl RuleRegistry<Trigger> {
    /// 處理一行文字
    ///
    /// 依優先級嘗試匹配，只執行第一個匹配的觸發器。
    /// 動作失敗不影響 gag 的結果。
    pub fn process(&self, line: &str, dispatcher: &mut ActionDispatcher) -> TriggerOutcome {
        for trigger in self.iter().filter(|t| t.enabled) {
            let Some(m) = trigger.try_match(line) else {
                continue;
            };

            debug!("觸發器 '{}' 匹配: {}", trigger.name, m.matched());
            dispatcher.invoke(&trigger.name, &trigger.action, Some(&m));

            return TriggerOutcome {
                fired: Some(trigger.name.clone()),
                gag: trigger.gag,
            };
        }

        TriggerOutcome::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{action_fn, send_template, ActionError, Effect};

    fn echo(text: &'static str) -> Action {
        action_fn(move |_, ctx| {
            ctx.echo(text);
            Ok(())
        })
    }

    #[test]
    fn test_regex_trigger() {
        let trigger = Trigger::new("gold", r"你獲得了\s*(\d+)\s*金幣", echo("gold")).unwrap();

        let m = trigger.try_match("戰鬥結束，你獲得了 100 金幣！").unwrap();
        assert_eq!(m.group(1), Some("100"));
        assert!(trigger.try_match("你恢復了健康").is_none());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = Trigger::new("bad", "([", echo("x")).unwrap_err();
        assert_eq!(err.name, "bad");
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = TriggerRegistry::new();
        registry.register(Trigger::new("low", "orc", echo("low")).unwrap().with_priority(1));
        registry.register(Trigger::new("high", "orc", echo("high")).unwrap().with_priority(10));

        let mut dispatcher = ActionDispatcher::new();
        let outcome = registry.process("An orc arrives.", &mut dispatcher);

        assert_eq!(outcome.fired.as_deref(), Some("high"));
        assert_eq!(dispatcher.take_effects(), vec![Effect::Echo("high".to_string())]);
    }

    #[test]
    fn test_gag_trigger() {
        let mut registry = TriggerRegistry::new();
        registry.register(
            Trigger::new("gag_spam", "廣告", echo("gagged"))
                .unwrap()
                .with_gag(true),
        );

        let mut dispatcher = ActionDispatcher::new();
        assert!(registry.process("這是一則廣告訊息", &mut dispatcher).gag);
        assert!(!registry.process("正常訊息", &mut dispatcher).gag);
    }

    #[test]
    fn test_gag_survives_failing_action() {
        let mut registry = TriggerRegistry::new();
        let failing = action_fn(|_, _| Err(ActionError::Failed("boom".to_string())));
        registry.register(Trigger::new("spam", "spam", failing).unwrap().with_gag(true));

        let mut dispatcher = ActionDispatcher::new();
        let outcome = registry.process("spam spam", &mut dispatcher);
        assert!(outcome.gag);
        assert_eq!(outcome.fired.as_deref(), Some("spam"));
    }

    #[test]
    fn test_disabled_trigger_never_fires() {
        let mut registry = TriggerRegistry::new();
        registry.register(
            Trigger::new("test", "test", echo("x"))
                .unwrap()
                .with_enabled(false),
        );

        let mut dispatcher = ActionDispatcher::new();
        assert_eq!(
            registry.process("this is a test", &mut dispatcher),
            TriggerOutcome::default()
        );
    }

    #[test]
    fn test_template_action() {
        let mut registry = TriggerRegistry::new();
        registry.register(
            Trigger::new("gold", r"獲得\s*(\d+)\s*金", send_template("say 我拿到 {1} 金"))
                .unwrap(),
        );

        let mut dispatcher = ActionDispatcher::new();
        registry.process("你獲得 50 金幣", &mut dispatcher);
        assert_eq!(
            dispatcher.take_effects(),
            vec![Effect::Send("say 我拿到 50 金".to_string())]
        );
    }
}
