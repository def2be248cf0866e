//! 連線 Session
//!
//! [`Session`] 是唯一持有 Telnet 解析器、規則引擎、動作分派器與地圖的物件。
//! 網路層把收到的位元組交給 [`Session::receive`]，使用者輸入交給
//! [`Session::input`]，計時器由 [`Session::tick`] 驅動；每個呼叫都回傳
//! [`SessionOutput`]，由前端負責顯示與送出。

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::{ActionDispatcher, Effect, Telemetry};
use crate::encoding::TextCodec;
use crate::map::{MapController, MapUpdate, RoomInfo};
use crate::rules::{RuleEngine, DEFAULT_ALIAS_DEPTH};
use crate::telnet::{
    encode_gmcp, escape_iac, negotiation_reply, Frame, TelnetCommand, TelnetOption, TelnetParser,
};

/// 觸發地圖更新的 GMCP package
pub const ROOM_INFO_PACKAGE: &str = "Room.Info";

/// Session 設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 伺服器文字編碼（WHATWG 標籤）
    pub encoding: String,
    /// Alias 連鎖展開的最大深度
    pub alias_max_depth: usize,
    /// 動作送出的命令再次進入 Alias 處理的最大深度
    pub send_max_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            alias_max_depth: DEFAULT_ALIAS_DEPTH,
            send_max_depth: DEFAULT_ALIAS_DEPTH,
        }
    }
}

/// 要顯示的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayLine {
    /// 伺服器文字
    Plain(String),
    /// 動作的本地輸出
    Echo(String),
    /// 動作的格式化輸出（HTML 標記）
    Formatted(String),
    /// 以 GoAhead 結束的提示字元
    Prompt(String),
}

impl DisplayLine {
    pub fn text(&self) -> &str {
        match self {
            Self::Plain(s) | Self::Echo(s) | Self::Formatted(s) | Self::Prompt(s) => s,
        }
    }
}

/// 單次呼叫的結果
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SessionOutput {
    pub display: Vec<DisplayLine>,
    /// 待送往伺服器的位元組（已編碼與轉義）
    pub outbound: Vec<Vec<u8>>,
    pub map_changed: bool,
    /// 最近一次進入的房間
    pub room: Option<MapUpdate>,
    /// 輸入遮蔽狀態的變化（伺服器 WILL ECHO = 遮蔽）
    pub echo_masked: Option<bool>,
}

impl SessionOutput {
    pub fn is_empty(&self) -> bool {
        self.display.is_empty()
            && self.outbound.is_empty()
            && !self.map_changed
            && self.echo_masked.is_none()
    }

    /// 將另一份輸出接在後面
    pub fn extend(&mut self, other: SessionOutput) {
        self.display.extend(other.display);
        self.outbound.extend(other.outbound);
        self.map_changed |= other.map_changed;
        if other.room.is_some() {
            self.room = other.room;
        }
        if other.echo_masked.is_some() {
            self.echo_masked = other.echo_masked;
        }
    }
}

/// 連線 Session
pub struct Session {
    config: SessionConfig,
    parser: TelnetParser,
    codec: TextCodec,
    engine: RuleEngine,
    dispatcher: ActionDispatcher,
    map: MapController,
    /// 尚未遇到換行的位元組
    partial: Vec<u8>,
    echo_masked: bool,
}

impl Session {
    pub fn new(config: SessionConfig, engine: RuleEngine, map: MapController) -> Self {
        let codec = TextCodec::for_label(&config.encoding);
        info!(
            "Session 建立: encoding={}, alias 深度 {}, send 深度 {}",
            codec.name(),
            config.alias_max_depth,
            config.send_max_depth
        );

        Self {
            config,
            parser: TelnetParser::new(),
            codec,
            engine,
            dispatcher: ActionDispatcher::new(),
            map,
            partial: Vec::new(),
            echo_masked: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// 規則變更後用來重新載入或套用單筆記錄
    pub fn engine_mut(&mut self) -> &mut RuleEngine {
        &mut self.engine
    }

    pub fn map(&self) -> &MapController {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MapController {
        &mut self.map
    }

    pub fn telemetry(&self) -> &Telemetry {
        self.dispatcher.telemetry()
    }

    pub fn echo_masked(&self) -> bool {
        self.echo_masked
    }

    /// 處理伺服器送來的位元組
    pub fn receive(&mut self, bytes: &[u8]) -> SessionOutput {
        let mut out = SessionOutput::default();

        for frame in self.parser.feed(bytes) {
            match frame {
                Frame::Data(data) => self.on_data(&data, &mut out),
                Frame::GoAhead => {
                    if let Some(prompt) = self.take_partial() {
                        self.on_prompt(prompt, &mut out);
                    }
                }
                Frame::Negotiation(cmd, option) => self.on_negotiation(cmd, option, &mut out),
                Frame::Subnegotiation(option, payload) => {
                    debug!("Sub-negotiation {:?}: {} bytes", option, payload.len());
                }
                Frame::Gmcp { package, payload } => {
                    self.on_gmcp(&package, payload.as_deref(), &mut out)
                }
            }
        }

        out
    }

    /// 處理使用者輸入的一行
    pub fn input(&mut self, text: &str) -> SessionOutput {
        let mut out = SessionOutput::default();

        let outcome = self.engine.expand_input(
            text,
            self.config.alias_max_depth,
            &mut self.dispatcher,
        );
        if let Some(command) = outcome.into_command() {
            self.push_command(&command, &mut out);
        }
        self.drain_effects(1, &mut out);

        out
    }

    /// 觸發到期的計時器
    pub fn tick(&mut self, now: Instant) -> SessionOutput {
        let mut out = SessionOutput::default();
        let fired = self.engine.tick(now, &mut self.dispatcher);
        if fired > 0 {
            debug!("{} 個計時器已觸發", fired);
        }
        self.drain_effects(0, &mut out);
        out
    }

    /// 連線建立
    pub fn connected(&mut self) -> SessionOutput {
        self.fire("on_connect", &[])
    }

    /// 連線中斷；未結束的行會以一般文字輸出
    pub fn disconnected(&mut self) -> SessionOutput {
        let mut out = SessionOutput::default();
        if let Some(line) = self.take_partial() {
            self.on_line(line, &mut out);
        }
        self.parser = TelnetParser::new();
        if self.echo_masked {
            self.echo_masked = false;
            out.echo_masked = Some(false);
        }
        out.extend(self.fire("on_disconnect", &[]));
        out
    }

    /// 將尚未結束的行當作提示字元輸出（伺服器不送 GoAhead 時使用）
    pub fn flush_prompt(&mut self) -> SessionOutput {
        let mut out = SessionOutput::default();
        if let Some(prompt) = self.take_partial() {
            self.on_prompt(prompt, &mut out);
        }
        out
    }

    /// 目前是否有尚未結束的行
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    fn fire(&mut self, event: &str, args: &[String]) -> SessionOutput {
        let mut out = SessionOutput::default();
        self.fire_into(event, args, &mut out);
        out
    }

    fn fire_into(&mut self, event: &str, args: &[String], out: &mut SessionOutput) {
        self.engine.fire(event, args, &mut self.dispatcher);
        self.drain_effects(0, out);
    }

    fn on_data(&mut self, data: &[u8], out: &mut SessionOutput) {
        let mut rest = data;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            let line = self.codec.decode(&std::mem::take(&mut self.partial));
            self.on_line(line, out);
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);
    }

    fn take_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        Some(self.codec.decode(&std::mem::take(&mut self.partial)))
    }

    fn on_line(&mut self, line: String, out: &mut SessionOutput) {
        let outcome = self.engine.process_line(&line, &mut self.dispatcher);
        if !outcome.gag {
            out.display.push(DisplayLine::Plain(line));
        } else {
            debug!("行已隱藏 (trigger '{}')", outcome.fired.as_deref().unwrap_or(""));
        }
        self.drain_effects(0, out);
    }

    /// 提示字元同樣經過 trigger，但顯示時不換行
    fn on_prompt(&mut self, prompt: String, out: &mut SessionOutput) {
        let outcome = self.engine.process_line(&prompt, &mut self.dispatcher);
        if !outcome.gag {
            out.display.push(DisplayLine::Prompt(prompt));
        } else {
            debug!("提示字元已隱藏 (trigger '{}')", outcome.fired.as_deref().unwrap_or(""));
        }
        self.drain_effects(0, out);
    }

    fn on_negotiation(&mut self, cmd: TelnetCommand, option: TelnetOption, out: &mut SessionOutput) {
        let reply = negotiation_reply(cmd, option);
        if !reply.is_empty() {
            debug!("協商回應 {:?} {:?} -> {:?}", cmd, option, reply);
            out.outbound.push(reply);
        }

        if option == TelnetOption::Echo {
            let masked = match cmd {
                TelnetCommand::Will => true,
                TelnetCommand::Wont => false,
                _ => return,
            };
            if masked != self.echo_masked {
                self.echo_masked = masked;
                out.echo_masked = Some(masked);
            }
        }
    }

    fn on_gmcp(&mut self, package: &str, payload: Option<&str>, out: &mut SessionOutput) {
        debug!("GMCP {} {:?}", package, payload);
        self.dispatcher.telemetry_mut().update(package, payload);

        let args = vec![package.to_string(), payload.unwrap_or_default().to_string()];
        self.fire_into("on_gmcp", &args, out);

        if package.eq_ignore_ascii_case(ROOM_INFO_PACKAGE) {
            let Some(payload) = payload else {
                return;
            };
            match serde_json::from_str::<RoomInfo>(payload) {
                Ok(info) => {
                    if let Some(update) = self.map.on_room_info(&info) {
                        out.map_changed = true;
                        let args = vec![update.room.clone()];
                        out.room = Some(update);
                        self.fire_into("on_room", &args, out);
                    }
                }
                Err(e) => warn!("無法解析 Room.Info: {}", e),
            }
        }
    }

    /// 執行動作累積的效果
    ///
    /// `send` 會再經過 Alias 處理，超過 `send_max_depth` 時直接送出
    fn drain_effects(&mut self, depth: usize, out: &mut SessionOutput) {
        for effect in self.dispatcher.take_effects() {
            match effect {
                Effect::Send(text) => {
                    if depth >= self.config.send_max_depth {
                        warn!("送出深度超過 {}，不再展開: {}", self.config.send_max_depth, text);
                        self.push_command(&text, out);
                        continue;
                    }
                    let outcome = self.engine.expand_input(
                        &text,
                        self.config.alias_max_depth,
                        &mut self.dispatcher,
                    );
                    if let Some(command) = outcome.into_command() {
                        self.push_command(&command, out);
                    }
                    self.drain_effects(depth + 1, out);
                }
                Effect::Echo(text) => out.display.push(DisplayLine::Echo(text)),
                Effect::EchoFormatted(markup) => out.display.push(DisplayLine::Formatted(markup)),
                Effect::Gmcp { package, payload } => {
                    out.outbound.push(encode_gmcp(&package, payload.as_deref()));
                }
            }
        }
    }

    fn push_command(&self, command: &str, out: &mut SessionOutput) {
        let mut bytes = escape_iac(&self.codec.encode(command));
        bytes.extend_from_slice(b"\r\n");
        out.outbound.push(bytes);
    }
}
