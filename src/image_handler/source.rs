//! # Data URL 与中间模型
//!
//! ## 设计思路
//!
//! 链路上传递的始终是 `data:` URL 字符串（与浏览器侧约定一致），
//! `DataUrl` 在构造时完成一次校验，之后可随时取出声明的 MIME 与解码后的字节。

use base64::{Engine as _, engine::general_purpose};
use percent_encoding::percent_decode_str;

use super::ImageError;
use crate::protocol::ImageType;

/// 无法识别类型时使用的 MIME。
pub const OCTET_STREAM: &str = "application/octet-stream";

/// 已校验的 `data:` URL。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    raw: String,
    /// `data:` 之后到 `,` 之前的头部长度，用于切分。
    header_end: usize,
}

impl DataUrl {
    /// 解析并校验 `data:` URL。
    pub fn parse(raw: impl Into<String>) -> Result<Self, ImageError> {
        let raw = raw.into();
        if !is_inline(&raw) {
            return Err(ImageError::InvalidFormat("不是 data: URL".to_string()));
        }
        let header_end = raw
            .find(',')
            .ok_or_else(|| ImageError::InvalidFormat("data: URL 缺少数据段".to_string()))?;
        Ok(Self { raw, header_end })
    }

    /// 用原始字节构造 base64 编码的 data URL。
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let header = format!("data:{};base64", mime);
        let header_end = header.len();
        let mut raw = header;
        raw.push(',');
        raw.push_str(&general_purpose::STANDARD.encode(bytes));
        Self { raw, header_end }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn into_string(self) -> String {
        self.raw
    }

    /// 头部声明的 MIME；未声明时按规范视为 `text/plain`。
    pub fn mime(&self) -> &str {
        let header = &self.raw["data:".len()..self.header_end];
        let mime = header.split(';').next().unwrap_or("").trim();
        if mime.is_empty() { "text/plain" } else { mime }
    }

    fn is_base64(&self) -> bool {
        self.raw["data:".len()..self.header_end]
            .split(';')
            .skip(1)
            .any(|segment| segment.trim().eq_ignore_ascii_case("base64"))
    }

    /// 源数据已是目标格式时无需重新编码。
    ///
    /// 与浏览器侧一致，只看声明前缀 `data:image/<subtype>;`。
    pub fn matches_type(&self, image_type: ImageType) -> bool {
        let prefix = format!("data:{};", image_type.mime());
        self.raw.starts_with(&prefix)
    }

    /// 解出数据段的原始字节。
    pub fn decode_bytes(&self) -> Result<Vec<u8>, ImageError> {
        let payload = &self.raw[self.header_end + 1..];
        if self.is_base64() {
            let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            general_purpose::STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))
        } else {
            Ok(percent_decode_str(payload).collect())
        }
    }

    /// 日志与通知里使用的缩略形式，避免整段 base64 刷屏。
    pub fn summary(&self) -> String {
        const KEEP: usize = 48;
        if self.raw.len() <= KEEP {
            return self.raw.clone();
        }
        let mut end = KEEP;
        while !self.raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &self.raw[..end])
    }
}

impl std::fmt::Display for DataUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// 是否为内联（`data:`）地址，大小写不敏感。
pub fn is_inline(source: &str) -> bool {
    source
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// 抓取阶段输出：原始字节与其 MIME。
pub(crate) struct FetchedImage {
    pub(crate) bytes: bytes::Bytes,
    pub(crate) mime: Option<String>,
}
