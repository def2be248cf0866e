//! 規則動作的呼叫介面
//!
//! 規則（Trigger/Alias/Timer/Event）匹配後執行的 [`Action`] 只能透過
//! [`ActionContext`] 與外界互動：
//! - `send`：送出命令（會再經過 Alias 處理）
//! - `echo` / `echo_formatted`：本地顯示，不送往伺服器
//! - `send_gmcp`：送出 GMCP 訊息
//! - `telemetry`：唯讀的 GMCP 資料快照
//!
//! 動作產生的效果先排入 [`Effect`] 佇列，由 Session 統一處理。

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::rules::RuleMatch;
use crate::script::ScriptError;

/// 動作執行錯誤
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("{0}")]
    Failed(String),
}

/// 規則動作
///
/// 第一個參數為匹配結果（Timer / Event 為 `None`）
pub type Action = Rc<dyn Fn(Option<&RuleMatch>, &mut ActionContext<'_>) -> Result<(), ActionError>>;

/// 動作產生的效果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// 送出命令
    Send(String),
    /// 本地顯示純文字
    Echo(String),
    /// 本地顯示格式化內容（HTML 標記）
    EchoFormatted(String),
    /// 送出 GMCP 訊息
    Gmcp {
        package: String,
        payload: Option<String>,
    },
}

/// GMCP 資料快照（package -> 最新內容）
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    values: HashMap<String, Value>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得某個 package 的最新內容
    pub fn get(&self, package: &str) -> Option<&Value> {
        self.values.get(package)
    }

    /// 以 GMCP 訊息更新快照，payload 不是 JSON 時保留原始字串
    pub fn update(&mut self, package: &str, payload: Option<&str>) {
        let value = match payload {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
            None => Value::Null,
        };
        self.values.insert(package.to_string(), value);
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 動作可使用的唯一介面
pub struct ActionContext<'a> {
    effects: &'a mut Vec<Effect>,
    telemetry: &'a Telemetry,
    args: &'a [String],
}

impl<'a> ActionContext<'a> {
    /// 送出命令（之後仍會經過 Alias 展開）
    pub fn send(&mut self, text: impl Into<String>) {
        self.effects.push(Effect::Send(text.into()));
    }

    /// 本地顯示
    pub fn echo(&mut self, text: impl Into<String>) {
        self.effects.push(Effect::Echo(text.into()));
    }

    /// 本地顯示格式化內容
    pub fn echo_formatted(&mut self, markup: impl Into<String>) {
        self.effects.push(Effect::EchoFormatted(markup.into()));
    }

    /// 送出 GMCP 訊息
    pub fn send_gmcp(&mut self, package: impl Into<String>, payload: Option<String>) {
        self.effects.push(Effect::Gmcp {
            package: package.into(),
            payload,
        });
    }

    /// 唯讀的 GMCP 資料快照
    pub fn telemetry(&self) -> &Telemetry {
        self.telemetry
    }

    /// 事件參數（僅 Event 規則）
    pub fn args(&self) -> &[String] {
        self.args
    }
}

/// 執行動作並隔離錯誤
///
/// 持有 GMCP 快照與效果佇列；動作失敗（回傳錯誤或 panic）只會記錄日誌。
#[derive(Debug, Default)]
pub struct ActionDispatcher {
    telemetry: Telemetry,
    effects: Vec<Effect>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// 由外層應用程式更新快照
    pub fn telemetry_mut(&mut self) -> &mut Telemetry {
        &mut self.telemetry
    }

    /// 執行規則動作，成功時回傳 `true`
    pub fn invoke(&mut self, rule: &str, action: &Action, matched: Option<&RuleMatch>) -> bool {
        self.invoke_with_args(rule, action, matched, &[])
    }

    /// 執行規則動作並附帶事件參數
    pub fn invoke_with_args(
        &mut self,
        rule: &str,
        action: &Action,
        matched: Option<&RuleMatch>,
        args: &[String],
    ) -> bool {
        let mut ctx = ActionContext {
            effects: &mut self.effects,
            telemetry: &self.telemetry,
            args,
        };

        match catch_unwind(AssertUnwindSafe(|| action(matched, &mut ctx))) {
            Ok(Ok(())) => {
                debug!("規則 '{}' 已執行", rule);
                true
            }
            Ok(Err(e)) => {
                error!("規則 '{}' 執行失敗: {}", rule, e);
                false
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("規則 '{}' 執行時 panic: {}", rule, reason);
                false
            }
        }
    }

    /// 取出累積的效果
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn has_effects(&self) -> bool {
        !self.effects.is_empty()
    }
}

/// 建立以範本送出命令的動作
///
/// `{1}`、`{2}` 或 `{name}` 會以匹配的群組替換；空範本不送出任何東西
pub fn send_template(template: impl Into<String>) -> Action {
    let template = template.into();
    action_fn(move |matched, ctx| {
        if template.is_empty() {
            return Ok(());
        }
        let text = match matched {
            Some(m) => m.expand(&template),
            None => template.clone(),
        };
        ctx.send(text);
        Ok(())
    })
}

/// 從閉包建立動作
pub fn action_fn<F>(f: F) -> Action
where
    F: Fn(Option<&RuleMatch>, &mut ActionContext<'_>) -> Result<(), ActionError> + 'static,
{
    Rc::new(f)
}
