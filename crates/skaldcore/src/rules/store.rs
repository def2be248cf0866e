//! 規則持久化
//!
//! 每個 Profile 的規則以 JSON 陣列保存在 `rules.json`

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// 規則存取錯誤
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("規則 '{0}' 已存在")]
    Duplicate(String),

    #[error("找不到規則 '{0}'")]
    NotFound(String),

    #[error("讀寫規則檔失敗: {0}")]
    Io(#[from] io::Error),

    #[error("規則檔格式錯誤: {0}")]
    Json(#[from] serde_json::Error),
}

/// 規則類別
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RuleCategory {
    Trigger,
    Alias,
    Timer,
    /// 事件處理器，名稱以 `on_` 開頭
    Event(String),
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trigger => f.write_str("trigger"),
            Self::Alias => f.write_str("alias"),
            Self::Timer => f.write_str("timer"),
            Self::Event(name) => f.write_str(name),
        }
    }
}

impl FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trigger" => Ok(Self::Trigger),
            "alias" => Ok(Self::Alias),
            "timer" => Ok(Self::Timer),
            event if event.starts_with("on_") && event.len() > 3 => Ok(Self::Event(event.to_string())),
            other => Err(format!("未知的規則類別: {}", other)),
        }
    }
}

impl TryFrom<String> for RuleCategory {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RuleCategory> for String {
    fn from(category: RuleCategory) -> Self {
        category.to_string()
    }
}

/// 規則內容的形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleBody {
    /// Lua 腳本
    #[default]
    Script,
    /// 文字範本（`{1}`、`{name}` 佔位符）
    Template,
}

/// 持久化的規則
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub name: String,
    pub category: RuleCategory,
    /// 正則表達式（Trigger / Alias 使用，空白代表匹配任何文字）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// 觸發間隔毫秒（Timer 使用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    /// 腳本或範本內容
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub body: RuleBody,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    /// 匹配後隱藏該行（僅 Trigger）
    #[serde(default)]
    pub gag: bool,
}

fn default_true() -> bool {
    true
}

impl RuleRecord {
    /// 創建新規則
    pub fn new(name: impl Into<String>, category: RuleCategory, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category,
            pattern: None,
            interval_ms: None,
            code: code.into(),
            body: RuleBody::Script,
            enabled: true,
            priority: 0,
            gag: false,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = Some(interval_ms);
        self
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

    pub fn as_template(mut self) -> Self {
        self.body = RuleBody::Template;
        self
    }
}

/// Profile 的規則集合，保持建立順序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleStore {
    records: Vec<RuleRecord>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 從檔案載入，檔案不存在時回傳空集合
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let store: Self = serde_json::from_str(&content)?;
        info!("已載入 {} 條規則: {}", store.records.len(), path.display());
        Ok(store)
    }

    /// 保存到檔案
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 新增規則，名稱不可重複
    pub fn create(&mut self, record: RuleRecord) -> Result<(), StoreError> {
        if self.find(&record.name).is_some() {
            return Err(StoreError::Duplicate(record.name));
        }
        self.records.push(record);
        Ok(())
    }

    /// 更新規則（可改名）
    pub fn update(&mut self, old_name: &str, record: RuleRecord) -> Result<(), StoreError> {
        if record.name != old_name && self.find(&record.name).is_some() {
            return Err(StoreError::Duplicate(record.name));
        }
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.name == old_name)
            .ok_or_else(|| StoreError::NotFound(old_name.to_string()))?;
        *slot = record;
        Ok(())
    }

    /// 刪除規則
    pub fn delete(&mut self, name: &str) -> Option<RuleRecord> {
        let index = self.records.iter().position(|r| r.name == name)?;
        Some(self.records.remove(index))
    }

    /// 切換啟用狀態，回傳新的狀態
    pub fn toggle(&mut self, name: &str) -> Option<bool> {
        let record = self.records.iter_mut().find(|r| r.name == name)?;
        record.enabled = !record.enabled;
        Some(record.enabled)
    }

    pub fn find(&self, name: &str) -> Option<&RuleRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// 依優先級（高到低）列出，可指定類別
    pub fn list(&self, category: Option<&RuleCategory>) -> Vec<&RuleRecord> {
        let mut list: Vec<&RuleRecord> = self
            .records
            .iter()
            .filter(|r| category.map_or(true, |c| &r.category == c))
            .collect();
        list.sort_by(|a, b| b.priority.cmp(&a.priority));
        list
    }

    /// 所有規則（建立順序）
    pub fn records(&self) -> &[RuleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
