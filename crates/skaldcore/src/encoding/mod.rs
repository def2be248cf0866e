//! 文字編解碼模組
//!
//! 依 Profile 設定的編碼（UTF-8、Big5 等）轉換伺服器文字

use encoding_rs::{Encoding, UTF_8};
use tracing::warn;

/// 連線使用的文字編碼
#[derive(Debug, Clone, Copy)]
pub struct TextCodec {
    encoding: &'static Encoding,
}

impl Default for TextCodec {
    fn default() -> Self {
        Self { encoding: UTF_8 }
    }
}

impl TextCodec {
    /// 依 WHATWG 編碼標籤建立，例如 `"utf-8"`、`"big5"`
    ///
    /// 無法識別的標籤會退回 UTF-8
    ///
    /// # Example
    /// ```
    /// use skaldcore::encoding::TextCodec;
    ///
    /// let codec = TextCodec::for_label("big5");
    /// assert_eq!(codec.name(), "Big5");
    /// ```
    pub fn for_label(label: &str) -> Self {
        match Encoding::for_label(label.trim().as_bytes()) {
            Some(encoding) => Self { encoding },
            None => {
                warn!("未知的編碼 '{}'，改用 UTF-8", label);
                Self::default()
            }
        }
    }

    /// 編碼名稱
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// 將伺服器位元組解碼為字串（無效字元會被替換為 U+FFFD）
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (decoded, _, _) = self.encoding.decode(bytes);
        decoded.into_owned()
    }

    /// 將字串編碼為伺服器位元組（無法編碼的字元會被替換）
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let (encoded, _, _) = self.encoding.encode(text);
        encoded.into_owned()
    }
}
