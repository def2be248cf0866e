//! 規則引擎
//!
//! 把持久化的 [`RuleRecord`] 編譯為可執行的規則，並分派到各個登錄表

use std::rc::Rc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use super::{
    Alias, AliasBody, AliasOutcome, AliasRegistry, EventHandler, EventRegistry, PatternError,
    RuleBody, RuleCategory, RuleRecord, Timer, TimerScheduler, Trigger, TriggerOutcome,
    TriggerRegistry,
};
use crate::action::{send_template, Action, ActionDispatcher};
use crate::script::{ActionCompiler, ScriptError};

/// 規則編譯錯誤
#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("規則 '{name}' 的腳本無效: {source}")]
    Script {
        name: String,
        #[source]
        source: ScriptError,
    },
}

impl RuleError {
    /// 出錯的規則名稱
    pub fn rule_name(&self) -> &str {
        match self {
            Self::Pattern(e) => &e.name,
            Self::Script { name, .. } => name,
        }
    }
}

/// 編譯完成的規則
#[derive(Debug)]
pub enum CompiledRule {
    Trigger(Trigger),
    Alias(Alias),
    Timer(Timer),
    Event(EventHandler),
}

/// 持有所有規則登錄表
pub struct RuleEngine {
    triggers: TriggerRegistry,
    aliases: AliasRegistry,
    timers: TimerScheduler,
    events: EventRegistry,
    compiler: Rc<dyn ActionCompiler>,
}

impl RuleEngine {
    pub fn new(compiler: Rc<dyn ActionCompiler>) -> Self {
        Self {
            triggers: TriggerRegistry::new(),
            aliases: AliasRegistry::new(),
            timers: TimerScheduler::new(),
            events: EventRegistry::new(),
            compiler,
        }
    }

    /// 將一筆記錄編譯為規則
    pub fn compile(&self, record: &RuleRecord) -> Result<CompiledRule, RuleError> {
        let pattern = record.pattern.as_deref().unwrap_or("");

        let compiled = match &record.category {
            RuleCategory::Trigger => CompiledRule::Trigger(
                Trigger::new(&record.name, pattern, self.action_for(record)?)?
                    .with_priority(record.priority)
                    .with_gag(record.gag)
                    .with_enabled(record.enabled),
            ),
            RuleCategory::Alias => {
                let body = match record.body {
                    RuleBody::Template => AliasBody::Template(record.code.clone()),
                    RuleBody::Script => AliasBody::Script(self.action_for(record)?),
                };
                CompiledRule::Alias(
                    Alias::new(&record.name, pattern, body)?
                        .with_priority(record.priority)
                        .with_enabled(record.enabled),
                )
            }
            RuleCategory::Timer => {
                let interval = Duration::from_millis(record.interval_ms.unwrap_or(0));
                CompiledRule::Timer(
                    Timer::new(&record.name, interval, self.action_for(record)?)
                        .with_priority(record.priority)
                        .with_enabled(record.enabled),
                )
            }
            RuleCategory::Event(event) => CompiledRule::Event(
                EventHandler::new(&record.name, event, self.action_for(record)?)
                    .with_priority(record.priority)
                    .with_enabled(record.enabled),
            ),
        };

        Ok(compiled)
    }

    fn action_for(&self, record: &RuleRecord) -> Result<Action, RuleError> {
        match record.body {
            RuleBody::Template => Ok(send_template(record.code.clone())),
            RuleBody::Script => self
                .compiler
                .compile(&record.name, &record.code)
                .map_err(|source| RuleError::Script {
                    name: record.name.clone(),
                    source,
                }),
        }
    }

    /// 以整份規則清單重建所有登錄表
    ///
    /// 無效的規則會被略過並回傳錯誤，其餘規則照常載入
    pub fn load(&mut self, records: &[RuleRecord], now: Instant) -> Vec<RuleError> {
        let mut errors = Vec::new();
        let mut triggers = Vec::new();
        let mut aliases = Vec::new();
        let mut timers = Vec::new();
        let mut events = Vec::new();

        for record in records.iter().filter(|r| r.enabled) {
            match self.compile(record) {
                Ok(CompiledRule::Trigger(t)) => triggers.push(t),
                Ok(CompiledRule::Alias(a)) => aliases.push(a),
                Ok(CompiledRule::Timer(t)) => timers.push(t),
                Ok(CompiledRule::Event(e)) => events.push(e),
                Err(e) => {
                    warn!("略過規則: {}", e);
                    errors.push(e);
                }
            }
        }

        self.triggers.load(triggers);
        self.aliases.load(aliases);
        self.timers.load(timers, now);
        self.events.load(events);

        info!(
            "規則已載入: {} triggers, {} aliases, {} timers, {} event handlers",
            self.triggers.len(),
            self.aliases.len(),
            self.timers.len(),
            self.events.len()
        );

        errors
    }

    /// 套用單筆記錄的變更（新增、修改或停用）
    ///
    /// 編譯失敗時保留原本的規則
    pub fn apply(&mut self, record: &RuleRecord, now: Instant) -> Result<(), RuleError> {
        if !record.enabled {
            self.remove(&record.name);
            return Ok(());
        }

        let compiled = self.compile(record)?;
        self.remove(&record.name);

        match compiled {
            CompiledRule::Trigger(t) => self.triggers.register(t),
            CompiledRule::Alias(a) => self.aliases.register(a),
            CompiledRule::Timer(t) => self.timers.register(t, now),
            CompiledRule::Event(e) => self.events.register(e),
        }
        Ok(())
    }

    /// 從所有登錄表移除指定名稱的規則
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = [
            self.triggers.remove(name).is_some(),
            self.aliases.remove(name).is_some(),
            self.timers.remove(name),
            self.events.remove(name).is_some(),
        ];
        removed.contains(&true)
    }

    /// 處理伺服器的一行文字
    pub fn process_line(&self, line: &str, dispatcher: &mut ActionDispatcher) -> TriggerOutcome {
        self.triggers.process(line, dispatcher)
    }

    /// 處理使用者輸入
    pub fn expand_input(
        &self,
        input: &str,
        max_depth: usize,
        dispatcher: &mut ActionDispatcher,
    ) -> AliasOutcome {
        self.aliases.expand(input, max_depth, dispatcher)
    }

    /// 觸發到期的計時器
    pub fn tick(&mut self, now: Instant, dispatcher: &mut ActionDispatcher) -> usize {
        self.timers.tick(now, dispatcher)
    }

    /// 觸發事件
    pub fn fire(&self, event: &str, args: &[String], dispatcher: &mut ActionDispatcher) -> usize {
        self.events.fire(event, args, dispatcher)
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.triggers
    }

    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Effect;
    use crate::script::ScriptEngine;

    fn engine() -> RuleEngine {
        RuleEngine::new(Rc::new(ScriptEngine::new()))
    }

    #[test]
    fn test_load_sorts_into_registries() {
        let mut engine = engine();
        let records = vec![
            RuleRecord::new("t", RuleCategory::Trigger, "echo('hit')").with_pattern("orc"),
            RuleRecord::new("a", RuleCategory::Alias, "kill kobold")
                .with_pattern("^kk$")
                .as_template(),
            RuleRecord::new("tm", RuleCategory::Timer, "save").as_template().with_interval_ms(1000),
            RuleRecord::new("e", RuleCategory::Event("on_connect".into()), "send('look')"),
            RuleRecord::new("off", RuleCategory::Trigger, "x")
                .with_pattern("x")
                .with_enabled(false),
        ];

        let errors = engine.load(&records, Instant::now());
        assert!(errors.is_empty());
        assert_eq!(engine.triggers().names(), vec!["t"]);
        assert_eq!(engine.aliases().names(), vec!["a"]);
        assert!(engine.timers().contains("tm"));
        assert_eq!(engine.events().names(), vec!["e"]);
    }

    #[test]
    fn test_invalid_rules_do_not_block_others() {
        let mut engine = engine();
        let records = vec![
            RuleRecord::new("bad_re", RuleCategory::Trigger, "x")
                .with_pattern("(")
                .as_template(),
            RuleRecord::new("bad_lua", RuleCategory::Trigger, "function (").with_pattern("x"),
            RuleRecord::new("good", RuleCategory::Trigger, "ok")
                .with_pattern("x")
                .as_template(),
        ];

        let errors = engine.load(&records, Instant::now());
        let names: Vec<&str> = errors.iter().map(|e| e.rule_name()).collect();
        assert_eq!(names, vec!["bad_re", "bad_lua"]);
        assert!(matches!(errors[0], RuleError::Pattern(_)));
        assert!(matches!(errors[1], RuleError::Script { .. }));
        assert_eq!(engine.triggers().names(), vec!["good"]);
    }

    #[test]
    fn test_apply_replaces_and_moves_category() {
        let mut engine = engine();
        let now = Instant::now();
        engine
            .apply(
                &RuleRecord::new("r", RuleCategory::Trigger, "x").with_pattern("x").as_template(),
                now,
            )
            .unwrap();

        engine
            .apply(
                &RuleRecord::new("r", RuleCategory::Alias, "y").with_pattern("^x").as_template(),
                now,
            )
            .unwrap();

        assert!(engine.triggers().is_empty());
        assert_eq!(engine.aliases().names(), vec!["r"]);

        // 停用即移除
        engine
            .apply(
                &RuleRecord::new("r", RuleCategory::Alias, "y")
                    .with_pattern("^x")
                    .with_enabled(false),
                now,
            )
            .unwrap();
        assert!(engine.aliases().is_empty());
    }

    #[test]
    fn test_apply_invalid_keeps_previous() {
        let mut engine = engine();
        let now = Instant::now();
        engine
            .apply(
                &RuleRecord::new("r", RuleCategory::Trigger, "a").with_pattern("a").as_template(),
                now,
            )
            .unwrap();

        let result = engine.apply(
            &RuleRecord::new("r", RuleCategory::Trigger, "a").with_pattern("(").as_template(),
            now,
        );
        assert!(result.is_err());
        assert_eq!(engine.triggers().get("r").unwrap().pattern(), "a");
    }

    #[test]
    fn test_template_trigger_end_to_end() {
        let mut engine = engine();
        engine.load(
            &[RuleRecord::new("greet", RuleCategory::Trigger, "bow {1}")
                .with_pattern(r"(\w+) waves")
                .as_template()],
            Instant::now(),
        );

        let mut dispatcher = ActionDispatcher::new();
        let outcome = engine.process_line("Bob waves at you.", &mut dispatcher);
        assert_eq!(outcome.fired.as_deref(), Some("greet"));
        assert_eq!(
            dispatcher.take_effects(),
            vec![Effect::Send("bow Bob".to_string())]
        );
    }

    #[test]
    fn test_timer_and_event_dispatch() {
        let mut engine = engine();
        let start = Instant::now();
        engine.load(
            &[
                RuleRecord::new("save", RuleCategory::Timer, "save")
                    .as_template()
                    .with_interval_ms(500),
                RuleRecord::new("hello", RuleCategory::Event("on_connect".into()), "echo('hi')"),
            ],
            start,
        );

        let mut dispatcher = ActionDispatcher::new();
        assert_eq!(engine.tick(start + Duration::from_millis(500), &mut dispatcher), 1);
        assert_eq!(engine.fire("on_connect", &[], &mut dispatcher), 1);
        assert_eq!(
            dispatcher.take_effects(),
            vec![
                Effect::Send("save".to_string()),
                Effect::Echo("hi".to_string()),
            ]
        );
    }
}
