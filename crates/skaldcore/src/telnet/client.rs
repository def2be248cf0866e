//! Telnet 客戶端
//!
//! 非同步 Telnet 連線管理。協定解析由 [`super::TelnetParser`] 負責，
//! 這裡只處理連線、原始位元組讀取與送出。

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::protocol::{encode_gmcp, escape_iac};
use crate::encoding::TextCodec;

/// Telnet 客戶端錯誤
#[derive(Debug, Error)]
pub enum TelnetError {
    #[error("連線失敗: {0}")]
    ConnectionFailed(#[from] io::Error),

    #[error("連線逾時")]
    Timeout,

    #[error("未連線")]
    NotConnected,

    #[error("DNS 解析失敗: {0}")]
    DnsResolutionFailed(String),
}

/// 連線狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Telnet 客戶端配置
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// 連線逾時
    pub connect_timeout: Duration,
    /// 讀取緩衝區大小
    pub read_buffer_size: usize,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_buffer_size: 8192,
        }
    }
}

/// Telnet 客戶端
pub struct TelnetClient<S = TcpStream> {
    stream: Option<S>,
    config: TelnetConfig,
    state: ConnectionState,
    codec: TextCodec,
}

impl TelnetClient<TcpStream> {
    /// 創建新的 Telnet 客戶端
    pub fn new(config: TelnetConfig) -> Self {
        Self {
            stream: None,
            config,
            state: ConnectionState::Disconnected,
            codec: TextCodec::default(),
        }
    }

    /// 連線到 MUD 伺服器，依序嘗試 DNS 解析出的每個位址
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), TelnetError> {
        self.state = ConnectionState::Connecting;
        info!("正在連線到 {}:{}", host, port);

        match open_stream(host, port, self.config.connect_timeout).await {
            Ok(stream) => {
                info!("已連線到 {}:{}", host, port);
                self.stream = Some(stream);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }
}

async fn open_stream(host: &str, port: u16, limit: Duration) -> Result<TcpStream, TelnetError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TelnetError::DnsResolutionFailed(e.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(TelnetError::DnsResolutionFailed(format!("無法解析主機: {}", host)));
    }
    debug!("候選位址: {:?}", addrs);

    let mut last_error = TelnetError::Timeout;
    for addr in addrs {
        match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!("{} 連線失敗: {}", addr, e);
                last_error = TelnetError::ConnectionFailed(e);
            }
            Err(_) => {
                debug!("{} 連線逾時", addr);
                last_error = TelnetError::Timeout;
            }
        }
    }
    Err(last_error)
}

impl Default for TelnetClient<TcpStream> {
    fn default() -> Self {
        Self::new(TelnetConfig::default())
    }
}

impl<S> TelnetClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// 使用已建立的連線（測試或代理時使用）
    pub fn from_stream(stream: S, config: TelnetConfig) -> Self {
        Self {
            stream: Some(stream),
            config,
            state: ConnectionState::Connected,
            codec: TextCodec::default(),
        }
    }

    /// 設定送出文字時使用的編碼
    pub fn with_codec(mut self, codec: TextCodec) -> Self {
        self.codec = codec;
        self
    }

    /// 獲取連線狀態
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 斷開連線
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.state = ConnectionState::Disconnected;
        info!("已斷開連線");
    }

    /// 發送一行文字到伺服器（依設定編碼、轉義 IAC 並加上 CRLF）
    pub async fn send_line(&mut self, text: &str) -> Result<(), TelnetError> {
        let mut data = escape_iac(&self.codec.encode(text));
        data.extend_from_slice(b"\r\n");
        self.send_raw(&data).await?;
        debug!("已發送: {}", text);
        Ok(())
    }

    /// 發送 GMCP 訊息
    pub async fn send_gmcp(&mut self, package: &str, payload: Option<&str>) -> Result<(), TelnetError> {
        self.send_raw(&encode_gmcp(package, payload)).await?;
        debug!("已發送 GMCP: {} {}", package, payload.unwrap_or(""));
        Ok(())
    }

    /// 發送原始位元組到伺服器
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), TelnetError> {
        let stream = self.stream.as_mut().ok_or(TelnetError::NotConnected)?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// 讀取一段原始位元組
    ///
    /// 伺服器關閉連線時回傳 [`TelnetError::NotConnected`]
    pub async fn read_chunk(&mut self) -> Result<Vec<u8>, TelnetError> {
        let stream = self.stream.as_mut().ok_or(TelnetError::NotConnected)?;

        let mut buffer = vec![0u8; self.config.read_buffer_size];
        let n = stream.read(&mut buffer).await?;

        if n == 0 {
            self.stream = None;
            self.state = ConnectionState::Disconnected;
            info!("伺服器已關閉連線");
            return Err(TelnetError::NotConnected);
        }

        buffer.truncate(n);
        Ok(buffer)
    }
}
