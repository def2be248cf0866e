//! Telnet 協定常數與協商策略
//!
//! 實作 RFC 854 Telnet 協定的基本命令，以及 GMCP (option 201) 的封包編碼

/// Telnet IAC (Interpret As Command) - 0xFF
pub const IAC: u8 = 255;

/// Telnet 命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TelnetCommand {
    /// Sub-negotiation End
    Se = 240,
    /// No Operation
    Nop = 241,
    /// Data Mark
    DataMark = 242,
    /// Break
    Break = 243,
    /// Interrupt Process
    InterruptProcess = 244,
    /// Abort Output
    AbortOutput = 245,
    /// Are You There
    AreYouThere = 246,
    /// Erase Character
    EraseCharacter = 247,
    /// Erase Line
    EraseLine = 248,
    /// Go Ahead
    GoAhead = 249,
    /// Sub-negotiation Begin
    Sb = 250,
    /// Will
    Will = 251,
    /// Won't
    Wont = 252,
    /// Do
    Do = 253,
    /// Don't
    Dont = 254,
}

impl TelnetCommand {
    /// 從位元組解析 Telnet 命令
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            240 => Some(Self::Se),
            241 => Some(Self::Nop),
            242 => Some(Self::DataMark),
            243 => Some(Self::Break),
            244 => Some(Self::InterruptProcess),
            245 => Some(Self::AbortOutput),
            246 => Some(Self::AreYouThere),
            247 => Some(Self::EraseCharacter),
            248 => Some(Self::EraseLine),
            249 => Some(Self::GoAhead),
            250 => Some(Self::Sb),
            251 => Some(Self::Will),
            252 => Some(Self::Wont),
            253 => Some(Self::Do),
            254 => Some(Self::Dont),
            _ => None,
        }
    }

    /// 是否為 WILL/WONT/DO/DONT 協商命令
    pub fn is_negotiation(&self) -> bool {
        matches!(self, Self::Will | Self::Wont | Self::Do | Self::Dont)
    }
}

/// Telnet 選項
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    /// Binary Transmission
    BinaryTransmission,
    /// Echo
    Echo,
    /// Suppress Go Ahead
    SuppressGoAhead,
    /// Terminal Type
    TerminalType,
    /// Window Size (NAWS)
    Naws,
    /// Charset
    Charset,
    /// MCCP2 (MUD Client Compression Protocol)
    Mccp2,
    /// GMCP (Generic MUD Communication Protocol)
    Gmcp,
    /// Unknown option
    Unknown(u8),
}

impl TelnetOption {
    /// 從位元組解析 Telnet 選項
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::BinaryTransmission,
            1 => Self::Echo,
            3 => Self::SuppressGoAhead,
            24 => Self::TerminalType,
            31 => Self::Naws,
            42 => Self::Charset,
            86 => Self::Mccp2,
            201 => Self::Gmcp,
            other => Self::Unknown(other),
        }
    }

    /// 獲取選項的位元組值
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::BinaryTransmission => 0,
            Self::Echo => 1,
            Self::SuppressGoAhead => 3,
            Self::TerminalType => 24,
            Self::Naws => 31,
            Self::Charset => 42,
            Self::Mccp2 => 86,
            Self::Gmcp => 201,
            Self::Unknown(b) => *b,
        }
    }
}

/// 回應伺服器的協商請求
///
/// 伺服器 WILL ECHO / SGA / GMCP 時回 DO，其他 WILL 回 DONT，
/// 所有 DO 回 WONT；WONT/DONT 不需回應
pub fn negotiation_reply(cmd: TelnetCommand, option: TelnetOption) -> Vec<u8> {
    let reply = match cmd {
        TelnetCommand::Will => match option {
            TelnetOption::Echo | TelnetOption::SuppressGoAhead | TelnetOption::Gmcp => {
                TelnetCommand::Do
            }
            _ => TelnetCommand::Dont,
        },
        TelnetCommand::Do => TelnetCommand::Wont,
        _ => return vec![],
    };

    vec![IAC, reply as u8, option.as_byte()]
}

/// 將 0xFF 轉義為 IAC IAC
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    out
}

/// 產生 GMCP 封包：IAC SB GMCP <package[ payload]> IAC SE
pub fn encode_gmcp(package: &str, payload: Option<&str>) -> Vec<u8> {
    let body = match payload {
        Some(p) => format!("{} {}", package, p),
        None => package.to_string(),
    };

    let mut out = vec![IAC, TelnetCommand::Sb as u8, TelnetOption::Gmcp.as_byte()];
    out.extend(escape_iac(body.as_bytes()));
    out.extend_from_slice(&[IAC, TelnetCommand::Se as u8]);
    out
}
