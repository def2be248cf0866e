//! Alias（別名）模組
//!
//! 將簡短輸入展開為完整命令。匹配必須從輸入開頭開始。
//!
//! 範本別名的展開結果會再次經過別名匹配，最多展開 [`DEFAULT_ALIAS_DEPTH`] 次；
//! 腳本別名則攔截輸入，由腳本自行決定送出內容。

use std::fmt;

use regex::Regex;
use tracing::{debug, warn};

use super::{compile_pattern, PatternError, Rule, RuleMatch, RuleRegistry};
use crate::action::{Action, ActionDispatcher};

/// 別名登錄表
pub type AliasRegistry = RuleRegistry<Alias>;

/// 別名連續展開的預設上限
pub const DEFAULT_ALIAS_DEPTH: usize = 5;

/// 別名內容
#[derive(Clone)]
pub enum AliasBody {
    /// 展開範本（支援 `{1}`、`{name}` 佔位符）
    Template(String),
    /// 由動作處理，輸入本身不會送出
    Script(Action),
}

impl fmt::Debug for AliasBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Self::Script(_) => f.write_str("Script(..)"),
        }
    }
}

/// 別名定義
#[derive(Debug, Clone)]
pub struct Alias {
    /// 別名名稱（用於識別）
    pub name: String,
    pub priority: i32,
    pub enabled: bool,
    pub body: AliasBody,
    regex: Regex,
}

impl Alias {
    /// 創建新的別名
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        body: AliasBody,
    ) -> Result<Self, PatternError> {
        let name = name.into();
        let regex = compile_pattern(&name, pattern)?;
        Ok(Self {
            name,
            priority: 0,
            enabled: true,
            body,
            regex,
        })
    }

    /// 創建範本別名
    pub fn template(
        name: impl Into<String>,
        pattern: &str,
        template: impl Into<String>,
    ) -> Result<Self, PatternError> {
        Self::new(name, pattern, AliasBody::Template(template.into()))
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// 嘗試匹配輸入，匹配必須從第 0 個字元開始
    pub fn try_match(&self, input: &str) -> Option<RuleMatch> {
        let captures = self.regex.captures(input)?;
        let whole = captures.get(0)?;
        if whole.start() != 0 {
            return None;
        }
        Some(RuleMatch::from_captures(&self.regex, &captures))
    }
}

impl Rule for Alias {
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

/// 別名處理結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasOutcome {
    /// 沒有別名匹配，原樣送出
    Passthrough(String),
    /// 經過展開後的命令
    Expanded(String),
    /// 被腳本別名攔截，不送出
    Intercepted,
}

impl AliasOutcome {
    /// 需要送往伺服器的命令
    pub fn into_command(self) -> Option<String> {
        match self {
            Self::Passthrough(text) | Self::Expanded(text) => Some(text),
            Self::Intercepted => None,
        }
    }
}

impl RuleRegistry<Alias> {
    /// 找出第一個匹配的別名
    pub fn find_match(&self, input: &str) -> Option<(&Alias, RuleMatch)> {
        self.iter()
            .filter(|a| a.enabled)
            .find_map(|alias| alias.try_match(input).map(|m| (alias, m)))
    }

    /// 處理使用者輸入
    ///
    /// 範本別名最多連續展開 `max_depth` 次，達到上限時回傳最後一次的展開結果
    pub fn expand(
        &self,
        input: &str,
        max_depth: usize,
        dispatcher: &mut ActionDispatcher,
    ) -> AliasOutcome {
        let mut current = input.to_string();
        let mut depth = 0;

        while let Some((alias, m)) = self.find_match(&current) {
            if depth >= max_depth {
                warn!("別名展開超過 {} 層，停止於: {}", max_depth, current);
                break;
            }

            match &alias.body {
                AliasBody::Template(template) => {
                    let expanded = m.expand(template);
                    debug!("別名 '{}' 展開: {} -> {}", alias.name, current, expanded);
                    current = expanded;
                    depth += 1;
                }
                AliasBody::Script(action) => {
                    debug!("別名 '{}' 攔截輸入: {}", alias.name, current);
                    dispatcher.invoke(&alias.name, action, Some(&m));
                    return AliasOutcome::Intercepted;
                }
            }
        }

        if depth == 0 {
            AliasOutcome::Passthrough(current)
        } else {
            AliasOutcome::Expanded(current)
        }
    }
}
