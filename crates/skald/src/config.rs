//! Profile 設定與檔案位置
//!
//! 每個 Profile 一個目錄：
//! - `profile.json`: 連線資訊與 Session 設定
//! - `rules.json`: 規則記錄
//! - `map.json`: 房間圖

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use skaldcore::SessionConfig;

const PROFILE_FILE: &str = "profile.json";
const RULES_FILE: &str = "rules.json";
const MAP_FILE: &str = "map.json";

/// 單一帳號/伺服器的設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile 識別名稱（用於目錄名稱，僅限 ASCII）
    pub name: String,
    /// 顯示名稱（可含中文）
    #[serde(default)]
    pub display_name: String,
    pub host: String,
    pub port: u16,
    /// 計時器檢查間隔（毫秒）
    #[serde(default = "default_timer_resolution")]
    pub timer_resolution_ms: u64,
    /// 沒有 GoAhead 時，未結束的行閒置多久後當作提示字元（毫秒）
    #[serde(default = "default_prompt_idle")]
    pub prompt_idle_ms: u64,
    #[serde(flatten)]
    pub session: SessionConfig,
}

fn default_timer_resolution() -> u64 {
    100
}

fn default_prompt_idle() -> u64 {
    300
}

impl Profile {
    pub fn new(name: &str, host: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            host: host.to_string(),
            port,
            timer_resolution_ms: default_timer_resolution(),
            prompt_idle_ms: default_prompt_idle(),
            session: SessionConfig::default(),
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.session.encoding = encoding.to_string();
        self
    }
}

/// Profile 目錄的管理
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 預設位置：`<config_dir>/skald/profiles`
    pub fn default_location() -> Self {
        Self::new(config_dir().join("profiles"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn rules_path(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join(RULES_FILE)
    }

    pub fn map_path(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join(MAP_FILE)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.profile_dir(name).join(PROFILE_FILE).exists()
    }

    /// 所有 Profile，依名稱排序；無法讀取的目錄會被略過
    pub fn list(&self) -> Result<Vec<Profile>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut profiles = Vec::new();
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("無法讀取 {}", self.root.display()))?;
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !self.exists(&name) {
                continue;
            }
            match self.load(&name) {
                Ok(profile) => profiles.push(profile),
                Err(e) => tracing::warn!("略過 Profile '{}': {:#}", name, e),
            }
        }
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    pub fn load(&self, name: &str) -> Result<Profile> {
        let path = self.profile_dir(name).join(PROFILE_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("找不到 Profile '{}' ({})", name, path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Profile 格式錯誤: {}", path.display()))
    }

    pub fn save(&self, profile: &Profile) -> Result<()> {
        validate_name(&profile.name)?;
        let dir = self.profile_dir(&profile.name);
        fs::create_dir_all(&dir).with_context(|| format!("無法建立 {}", dir.display()))?;

        let path = dir.join(PROFILE_FILE);
        let content = serde_json::to_string_pretty(profile)?;
        fs::write(&path, content).with_context(|| format!("無法寫入 {}", path.display()))?;
        Ok(())
    }
}

/// Profile 名稱只能使用 ASCII 英數字、`-` 與 `_`
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("無效的 Profile 名稱 '{}'", name);
    }
    Ok(())
}

/// 設定目錄
pub fn config_dir() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("skald"),
        None => PathBuf::from("."),
    }
}
