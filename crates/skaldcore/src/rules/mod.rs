//! 規則引擎模組
//!
//! Trigger / Alias / Timer / Event 共用同一套依優先級排序的登錄表：
//! - 名稱唯一
//! - 工作集合只包含已啟用的規則
//! - 依優先級由高到低排序，同優先級依加入順序（穩定排序）

mod alias;
mod engine;
mod event;
mod store;
mod timer;
mod trigger;

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

pub use alias::{Alias, AliasBody, AliasOutcome, AliasRegistry, DEFAULT_ALIAS_DEPTH};
pub use engine::{CompiledRule, RuleEngine, RuleError};
pub use event::{EventHandler, EventRegistry};
pub use store::{RuleBody, RuleCategory, RuleRecord, RuleStore, StoreError};
pub use timer::{Timer, TimerScheduler};
pub use trigger::{Trigger, TriggerOutcome, TriggerRegistry};

/// 正則表達式編譯失敗
#[derive(Debug, Error)]
#[error("規則 '{name}' 的正則表達式無效: {source}")]
pub struct PatternError {
    pub name: String,
    #[source]
    pub source: regex::Error,
}

/// 編譯規則的匹配模式
pub fn compile_pattern(name: &str, pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(pattern).map_err(|source| PatternError {
        name: name.to_string(),
        source,
    })
}

/// 登錄表中的規則
pub trait Rule {
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    fn is_enabled(&self) -> bool;
}

/// 依優先級排序的規則登錄表
#[derive(Debug)]
pub struct RuleRegistry<R> {
    rules: Vec<R>,
}

impl<R> Default for RuleRegistry<R> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<R: Rule> RuleRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以新的規則集合取代整個工作集合
    ///
    /// 新集合建好後才替換舊集合
    pub fn load(&mut self, rules: impl IntoIterator<Item = R>) {
        let mut fresh: Vec<R> = Vec::new();
        for rule in rules {
            if !rule.is_enabled() {
                continue;
            }
            fresh.retain(|r| r.name() != rule.name());
            fresh.push(rule);
        }
        sort_by_priority(&mut fresh);
        self.rules = fresh;
    }

    /// 加入規則，同名規則會先被移除
    ///
    /// 停用的規則只會移除舊版本，不會加入工作集合
    pub fn register(&mut self, rule: R) {
        self.rules.retain(|r| r.name() != rule.name());
        if rule.is_enabled() {
            self.rules.push(rule);
            sort_by_priority(&mut self.rules);
        }
    }

    /// 移除規則
    pub fn remove(&mut self, name: &str) -> Option<R> {
        let index = self.rules.iter().position(|r| r.name() == name)?;
        Some(self.rules.remove(index))
    }

    /// 獲取規則
    pub fn get(&self, name: &str) -> Option<&R> {
        self.rules.iter().find(|r| r.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 依優先級順序迭代
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rules.iter()
    }

    /// 依優先級順序列出名稱
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }
}

/// 優先級由高到低；`sort_by` 為穩定排序
fn sort_by_priority<R: Rule>(rules: &mut [R]) {
    rules.sort_by(|a, b| b.priority().cmp(&a.priority()));
}

/// 規則匹配結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// 群組內容，索引 0 為整段匹配
    groups: Vec<Option<String>>,
    /// 具名群組
    named: HashMap<String, String>,
}

impl RuleMatch {
    /// 從正則捕獲結果建立
    pub fn from_captures(regex: &Regex, captures: &Captures<'_>) -> Self {
        let groups = captures
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();

        let named = regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();

        Self { groups, named }
    }

    /// 整段匹配文字
    pub fn matched(&self) -> &str {
        self.group(0).unwrap_or("")
    }

    /// 第 `index` 個群組
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// 具名群組
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// 所有群組（索引 0 為整段匹配）
    pub fn groups(&self) -> &[Option<String>] {
        &self.groups
    }

    pub fn named_groups(&self) -> &HashMap<String, String> {
        &self.named
    }

    /// 展開範本：`{1}` 換成第 1 群組，`{name}` 換成具名群組
    ///
    /// 未匹配的編號群組換成空字串，其餘無法識別的佔位符保持原樣
    pub fn expand(&self, template: &str) -> String {
        static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
        let re = PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern"));

        re.replace_all(template, |caps: &Captures<'_>| {
            let key = &caps[1];
            if let Ok(index) = key.parse::<usize>() {
                if index < self.groups.len() {
                    return self.group(index).unwrap_or("").to_string();
                }
            } else if let Some(value) = self.name(key) {
                return value.to_string();
            }
            caps[0].to_string()
        })
        .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Dummy {
        name: &'static str,
        priority: i32,
        enabled: bool,
    }

    impl Rule for Dummy {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    fn dummy(name: &'static str, priority: i32) -> Dummy {
        Dummy {
            name,
            priority,
            enabled: true,
        }
    }

    #[test]
    fn test_priority_order_is_stable() {
        let mut registry = RuleRegistry::new();
        registry.register(dummy("a", 5));
        registry.register(dummy("b", 1));
        registry.register(dummy("c", 5));
        registry.register(dummy("d", 3));

        assert_eq!(registry.names(), vec!["a", "c", "d", "b"]);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = RuleRegistry::new();
        registry.register(dummy("a", 1));
        registry.register(dummy("b", 2));
        registry.register(dummy("a", 3));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().priority, 3);
    }

    #[test]
    fn test_disabled_rule_not_in_working_set() {
        let mut registry = RuleRegistry::new();
        registry.register(dummy("a", 1));
        registry.register(Dummy {
            name: "a",
            priority: 1,
            enabled: false,
        });

        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_replaces_everything() {
        let mut registry = RuleRegistry::new();
        registry.register(dummy("old", 1));

        registry.load(vec![
            dummy("x", 0),
            Dummy {
                name: "y",
                priority: 9,
                enabled: false,
            },
            dummy("z", 2),
        ]);

        assert_eq!(registry.names(), vec!["z", "x"]);
        assert!(!registry.contains("old"));
    }

    #[test]
    fn test_remove() {
        let mut registry = RuleRegistry::new();
        registry.register(dummy("a", 1));
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = compile_pattern("broken", "(unclosed").unwrap_err();
        assert_eq!(err.name, "broken");
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_rule_match_expand() {
        let re = Regex::new(r"^(\w+) (?P<target>\w+)(?: (\d+))?").unwrap();
        let caps = re.captures("kill orc").unwrap();
        let m = RuleMatch::from_captures(&re, &caps);

        assert_eq!(m.matched(), "kill orc");
        assert_eq!(m.group(1), Some("kill"));
        assert_eq!(m.name("target"), Some("orc"));
        assert_eq!(m.group(3), None);
        assert_eq!(m.expand("{1}:{target}:{3}:{9}:{nope}"), "kill:orc::{9}:{nope}");
    }
}
