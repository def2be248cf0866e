//! Telnet 協定模組
//!
//! 實作 Telnet/GMCP 位元組流解析與非同步連線管理

mod client;
mod parser;
mod protocol;

pub use client::{ConnectionState, TelnetClient, TelnetConfig, TelnetError};
pub use parser::{Frame, TelnetHandler, TelnetParser, MAX_SUBNEGOTIATION_LEN};
pub use protocol::{encode_gmcp, escape_iac, negotiation_reply, TelnetCommand, TelnetOption, IAC};
