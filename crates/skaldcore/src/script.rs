//! Lua 腳本支援模組
//!
//! 使用 mlua 執行規則腳本。每次執行都在獨立的環境表中進行，
//! 腳本只能看到：
//! - `match`：匹配群組（`match[0]` 為整段，`match[1]`... 為群組，具名群組以名稱存取）
//! - `args`：事件參數
//! - `gmcp`：GMCP 資料快照（唯讀副本）
//! - `send` / `echo` / `echo_html` / `send_gmcp`
//! - 安全的標準函式庫子集（`string`、`table`、`math` 等）

use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Lua, LuaSerdeExt, Table};
use thiserror::Error;

use crate::action::{action_fn, Action, ActionContext, Telemetry};
use crate::rules::RuleMatch;

/// 腳本執行錯誤
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Lua 錯誤: {0}")]
    Lua(String),
}

impl From<mlua::Error> for ScriptError {
    fn from(err: mlua::Error) -> Self {
        ScriptError::Lua(err.to_string())
    }
}

/// 將規則程式碼編譯為 [`Action`]
pub trait ActionCompiler {
    fn compile(&self, name: &str, code: &str) -> Result<Action, ScriptError>;
}

/// 腳本可存取的全域名稱
const SAFE_GLOBALS: &[&str] = &[
    "string", "table", "math", "pairs", "ipairs", "next", "select", "tostring", "tonumber",
    "type", "error", "pcall",
];

/// Lua 腳本引擎
pub struct ScriptEngine {
    lua: Rc<Lua>,
}

impl ScriptEngine {
    /// 創建新的腳本引擎
    pub fn new() -> Self {
        Self {
            lua: Rc::new(Lua::new()),
        }
    }

    /// 驗證腳本語法
    pub fn validate(&self, code: &str) -> Result<(), ScriptError> {
        self.lua.load(code).into_function()?;
        Ok(())
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionCompiler for ScriptEngine {
    /// 先檢查語法，執行時才建立環境
    fn compile(&self, name: &str, code: &str) -> Result<Action, ScriptError> {
        let chunk = chunk_name(name);
        self.lua.load(code).set_name(chunk.as_str()).into_function()?;

        let lua = Rc::clone(&self.lua);
        let code = code.to_string();
        Ok(action_fn(move |matched, ctx| {
            run_chunk(&lua, &chunk, &code, matched, ctx)?;
            Ok(())
        }))
    }
}

fn chunk_name(name: &str) -> String {
    format!("={}", name)
}

fn run_chunk(
    lua: &Lua,
    chunk: &str,
    code: &str,
    matched: Option<&RuleMatch>,
    ctx: &mut ActionContext<'_>,
) -> Result<(), ScriptError> {
    let env = build_env(lua, matched, ctx.telemetry(), ctx.args())?;
    let ctx = RefCell::new(ctx);

    lua.scope(|scope| {
        env.set(
            "send",
            scope.create_function(|_, text: String| {
                ctx.borrow_mut().send(text);
                Ok(())
            })?,
        )?;
        env.set(
            "echo",
            scope.create_function(|_, text: String| {
                ctx.borrow_mut().echo(text);
                Ok(())
            })?,
        )?;
        env.set(
            "echo_html",
            scope.create_function(|_, markup: String| {
                ctx.borrow_mut().echo_formatted(markup);
                Ok(())
            })?,
        )?;
        env.set(
            "send_gmcp",
            scope.create_function(|_, (package, payload): (String, Option<String>)| {
                ctx.borrow_mut().send_gmcp(package, payload);
                Ok(())
            })?,
        )?;

        lua.load(code)
            .set_name(chunk)
            .set_environment(env.clone())
            .exec()
    })?;

    Ok(())
}

/// 建立單次執行用的環境表
fn build_env(
    lua: &Lua,
    matched: Option<&RuleMatch>,
    telemetry: &Telemetry,
    args: &[String],
) -> mlua::Result<Table> {
    let env = lua.create_table()?;

    let globals = lua.globals();
    for key in SAFE_GLOBALS {
        let value = match globals.get(*key)? {
            // 函式庫表每次複製，腳本改動不會影響之後的執行
            mlua::Value::Table(lib) => mlua::Value::Table(copy_table(lua, &lib)?),
            other => other,
        };
        env.set(*key, value)?;
    }

    let groups = lua.create_table()?;
    if let Some(matched) = matched {
        for (index, group) in matched.groups().iter().enumerate() {
            if let Some(text) = group {
                groups.raw_set(index, text.as_str())?;
            }
        }
        for (name, value) in matched.named_groups() {
            groups.raw_set(name.as_str(), value.as_str())?;
        }
    }
    env.set("match", groups)?;
    env.set("args", lua.create_sequence_from(args.iter().map(String::as_str))?)?;
    env.set("gmcp", lua.to_value(telemetry.values())?)?;

    Ok(env)
}

fn copy_table(lua: &Lua, source: &Table) -> mlua::Result<Table> {
    let copy = lua.create_table()?;
    for pair in source.pairs::<mlua::Value, mlua::Value>() {
        let (key, value) = pair?;
        copy.raw_set(key, value)?;
    }
    Ok(copy)
}
