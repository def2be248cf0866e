//! Skald MUD Core Library
//!
//! 提供 MUD 客戶端的核心功能：
//! - `telnet`: Telnet/GMCP 位元組流解析與非同步連線
//! - `encoding`: UTF-8/Big5 等文字編解碼
//! - `rules`: Trigger / Alias / Timer / Event 規則與持久化
//! - `action`: 規則動作的呼叫介面
//! - `script`: Lua 腳本動作
//! - `map`: 房間圖與自動地圖
//! - `session`: 串接以上模組的連線 Session

pub mod action;
pub mod encoding;
pub mod map;
pub mod rules;
pub mod script;
pub mod session;
pub mod telnet;

pub use action::{Action, ActionContext, ActionDispatcher, ActionError, Effect, Telemetry};
pub use encoding::TextCodec;
pub use map::{MapController, RoomGraph, RoomInfo};
pub use rules::{RuleEngine, RuleRecord, RuleStore};
pub use script::{ActionCompiler, ScriptEngine, ScriptError};
pub use session::{DisplayLine, Session, SessionConfig, SessionOutput};
pub use telnet::{Frame, TelnetClient, TelnetParser};
