//! Telnet 位元組流狀態機
//!
//! 將任意切割的位元組流轉換為 [`Frame`]：
//! - 純文字資料（合併相鄰資料，並將 `\r\n`、`\r` 正規化為 `\n`）
//! - WILL/WONT/DO/DONT 協商
//! - Sub-negotiation 內容（GMCP 會再解析為 package + payload）
//! - Go Ahead
//!
//! 格式錯誤的序列一律在本地恢復：記錄日誌後回到 `Data` 狀態，不會回傳錯誤。

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use super::protocol::{TelnetCommand, TelnetOption, IAC};

/// Sub-negotiation 內容上限，超過即丟棄
pub const MAX_SUBNEGOTIATION_LEN: usize = 4096;

/// 解析結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// 純文字資料（已正規化換行）
    Data(Bytes),
    /// Telnet 協商命令
    Negotiation(TelnetCommand, TelnetOption),
    /// Sub-negotiation 資料
    Subnegotiation(TelnetOption, Bytes),
    /// Go Ahead
    GoAhead,
    /// 已解碼的 GMCP 訊息
    Gmcp {
        package: String,
        payload: Option<String>,
    },
}

/// 解析器回呼
///
/// 每個 `feed` 呼叫中，依 frame 順序同步呼叫。未實作的方法預設忽略。
pub trait TelnetHandler {
    fn on_data(&mut self, _data: &[u8]) {}
    fn on_negotiation(&mut self, _cmd: TelnetCommand, _option: TelnetOption) {}
    fn on_subnegotiation(&mut self, _option: TelnetOption, _payload: &[u8]) {}
    fn on_go_ahead(&mut self) {}
    fn on_gmcp(&mut self, _package: &str, _payload: Option<&str>) {}
}

/// 不處理任何回呼
struct NoopHandler;

impl TelnetHandler for NoopHandler {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Data,
    Iac,
    CommandOption(TelnetCommand),
    SubnegotiationOption,
    SubnegotiationData,
    SubnegotiationDataIac,
}

/// Telnet 解析器
#[derive(Debug)]
pub struct TelnetParser {
    state: ParserState,
    sb_option: TelnetOption,
    sb_buf: BytesMut,
    /// 上一段資料以 `\r` 結尾，下一個 `\n` 需要吞掉
    pending_cr: bool,
}

impl Default for TelnetParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetParser {
    /// 創建新的解析器
    pub fn new() -> Self {
        Self {
            state: ParserState::Data,
            sb_option: TelnetOption::Unknown(0),
            sb_buf: BytesMut::new(),
            pending_cr: false,
        }
    }

    /// 解析一段位元組，不呼叫任何回呼
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.feed_with(chunk, &mut NoopHandler)
    }

    /// 解析一段位元組，並依序呼叫 `handler`
    pub fn feed_with<H: TelnetHandler + ?Sized>(&mut self, chunk: &[u8], handler: &mut H) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut data = BytesMut::new();

        for &byte in chunk {
            match self.state {
                ParserState::Data => match byte {
                    IAC => self.state = ParserState::Iac,
                    0 => {}
                    _ => data.extend_from_slice(&[byte]),
                },

                ParserState::Iac => {
                    self.state = ParserState::Data;
                    if byte == IAC {
                        data.extend_from_slice(&[IAC]);
                        continue;
                    }
                    match TelnetCommand::from_byte(byte) {
                        Some(TelnetCommand::GoAhead) => {
                            self.push_frame(&mut frames, &mut data, Frame::GoAhead);
                        }
                        Some(TelnetCommand::Sb) => self.state = ParserState::SubnegotiationOption,
                        Some(cmd) if cmd.is_negotiation() => {
                            self.state = ParserState::CommandOption(cmd);
                        }
                        _ => debug!("無法識別的 IAC 命令: {}", byte),
                    }
                }

                ParserState::CommandOption(cmd) => {
                    let option = TelnetOption::from_byte(byte);
                    self.push_frame(&mut frames, &mut data, Frame::Negotiation(cmd, option));
                    self.state = ParserState::Data;
                }

                ParserState::SubnegotiationOption => {
                    self.sb_option = TelnetOption::from_byte(byte);
                    self.sb_buf.clear();
                    self.state = ParserState::SubnegotiationData;
                }

                ParserState::SubnegotiationData => {
                    if byte == IAC {
                        self.state = ParserState::SubnegotiationDataIac;
                    } else {
                        self.sb_buf.extend_from_slice(&[byte]);
                        if self.sb_buf.len() > MAX_SUBNEGOTIATION_LEN {
                            warn!(
                                "Sub-negotiation 內容超過 {} 位元組，已丟棄",
                                MAX_SUBNEGOTIATION_LEN
                            );
                            self.sb_buf.clear();
                            self.state = ParserState::Data;
                        }
                    }
                }

                ParserState::SubnegotiationDataIac => match byte {
                    b if b == TelnetCommand::Se as u8 => {
                        let payload = self.sb_buf.split().freeze();
                        let option = self.sb_option;
                        self.push_frame(
                            &mut frames,
                            &mut data,
                            Frame::Subnegotiation(option, payload.clone()),
                        );
                        if option == TelnetOption::Gmcp {
                            if let Some(frame) = decode_gmcp(&payload) {
                                frames.push(frame);
                            }
                        }
                        self.state = ParserState::Data;
                    }
                    IAC => {
                        self.sb_buf.extend_from_slice(&[IAC]);
                        self.state = ParserState::SubnegotiationData;
                    }
                    other => {
                        debug!("Sub-negotiation 中出現非預期的 IAC {}，已丟棄", other);
                        self.sb_buf.clear();
                        self.state = ParserState::Data;
                    }
                },
            }
        }

        self.flush_data(&mut frames, &mut data);

        for frame in &frames {
            match frame {
                Frame::Data(bytes) => handler.on_data(bytes),
                Frame::Negotiation(cmd, option) => handler.on_negotiation(*cmd, *option),
                Frame::Subnegotiation(option, payload) => handler.on_subnegotiation(*option, payload),
                Frame::GoAhead => handler.on_go_ahead(),
                Frame::Gmcp { package, payload } => handler.on_gmcp(package, payload.as_deref()),
            }
        }

        frames
    }

    /// 先送出累積的資料，再送出非資料 frame
    fn push_frame(&mut self, frames: &mut Vec<Frame>, data: &mut BytesMut, frame: Frame) {
        self.flush_data(frames, data);
        self.pending_cr = false;
        frames.push(frame);
    }

    /// 正規化換行並送出累積的資料
    fn flush_data(&mut self, frames: &mut Vec<Frame>, data: &mut BytesMut) {
        if data.is_empty() {
            return;
        }

        let mut cleaned = BytesMut::with_capacity(data.len());
        for &b in data.iter() {
            match b {
                b'\r' => {
                    cleaned.extend_from_slice(b"\n");
                    self.pending_cr = true;
                }
                b'\n' if self.pending_cr => self.pending_cr = false,
                _ => {
                    cleaned.extend_from_slice(&[b]);
                    self.pending_cr = false;
                }
            }
        }
        data.clear();

        if !cleaned.is_empty() {
            frames.push(Frame::Data(cleaned.freeze()));
        }
    }
}

/// 解析 GMCP 內容：`<package> <payload>`
fn decode_gmcp(payload: &[u8]) -> Option<Frame> {
    match std::str::from_utf8(payload) {
        Ok(text) => {
            let (package, rest) = match text.split_once(' ') {
                Some((package, rest)) => (package, Some(rest.to_string())),
                None => (text, None),
            };
            Some(Frame::Gmcp {
                package: package.to_string(),
                payload: rest,
            })
        }
        Err(e) => {
            warn!("GMCP 解碼失敗: {}", e);
            None
        }
    }
}
