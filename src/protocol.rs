//! # 跨上下文消息协议
//!
//! ## 设计思路
//!
//! 后台、内容脚本、离屏文档三者之间只通过一种信封格式通信：
//! `{ target, op, ...opSpecific }`。`op` 作为判别字段，映射为 Rust 的内部标签枚举，
//! 由 `serde` 负责解析与序列化，调用侧按分支穷尽匹配。
//!
//! ## 实现思路
//!
//! - `MessageEnvelope` = `target` + 扁平化的 `Operation`。
//! - 未知 `op` 不视为硬错误：`parse_envelope` 返回 `Parsed::UnknownOp`，
//!   由前端记录一条 warn 日志后丢弃。
//! - `ImageType` 同时承载线格式名称、MIME、菜单标签与菜单 ID 的互转。

use serde::{Deserialize, Serialize};

/// 菜单项 ID 前缀：`save_as_jpg` / `save_as_png` / `save_as_webp`。
pub const SAVE_AS_PREFIX: &str = "save_as_";
/// “在商店中查看”菜单项 ID。
pub const VIEW_IN_STORE_ID: &str = "view_in_store";
/// 菜单分隔线 ID。
pub const SEPARATOR_ID: &str = "sep_1";

/// 目标图片格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Jpg,
    Png,
    Webp,
}

impl ImageType {
    /// 菜单中注册的全部格式，顺序即菜单顺序。
    pub const ALL: [ImageType; 3] = [ImageType::Jpg, ImageType::Png, ImageType::Webp];

    /// 线格式名称，同时也是文件扩展名。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// 菜单标题里展示的格式名。
    pub fn label(self) -> &'static str {
        match self {
            Self::Jpg => "JPG",
            Self::Png => "PNG",
            Self::Webp => "WebP",
        }
    }

    pub fn menu_id(self) -> String {
        format!("{}{}", SAVE_AS_PREFIX, self.as_str())
    }

    /// 从菜单项 ID 反解格式；非 `save_as_*` 或未知格式返回 `None`。
    pub fn from_menu_id(menu_item_id: &str) -> Option<Self> {
        let suffix = menu_item_id.strip_prefix(SAVE_AS_PREFIX)?;
        Self::ALL.into_iter().find(|t| t.as_str() == suffix)
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Webp => image::ImageFormat::WebP,
        }
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 消息接收方所在的执行上下文。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Background,
    Content,
    Offscreen,
}

/// `notify` 操作的负载：结构化错误、纯文本，或任意其他 JSON。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotifyPayload {
    Error {
        /// 消息键（可本地化）或原始错误文本。
        error: String,
        #[serde(default, alias = "srcUrl", skip_serializing_if = "Option::is_none")]
        src: Option<String>,
    },
    Text(String),
    /// 其他形状原样保留，展示时使用 JSON 文本。
    Other(serde_json::Value),
}

impl Default for NotifyPayload {
    fn default() -> Self {
        Self::Other(serde_json::Value::Null)
    }
}

/// 按 `op` 字段区分的操作体。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    /// 直接下载：发往后台时字段名为 `url`，发往内容脚本时为 `src`。
    Download {
        #[serde(alias = "url")]
        src: String,
        filename: String,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        image_type: Option<ImageType>,
    },
    Notify {
        #[serde(default)]
        message: NotifyPayload,
    },
    /// 请求渲染面把 `src` 重新编码为 `type` 后自行完成下载。
    ConvertType {
        src: String,
        #[serde(rename = "type")]
        image_type: ImageType,
        filename: String,
    },
}

/// 上下文之间唯一的线格式。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub target: Target,
    #[serde(flatten)]
    pub op: Operation,
}

impl MessageEnvelope {
    pub fn new(target: Target, op: Operation) -> Self {
        Self { target, op }
    }

    pub fn download(target: Target, src: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::new(
            target,
            Operation::Download {
                src: src.into(),
                filename: filename.into(),
                image_type: None,
            },
        )
    }

    pub fn convert_type(
        target: Target,
        src: impl Into<String>,
        image_type: ImageType,
        filename: impl Into<String>,
    ) -> Self {
        Self::new(
            target,
            Operation::ConvertType {
                src: src.into(),
                image_type,
                filename: filename.into(),
            },
        )
    }

    pub fn notify_error(target: Target, error: impl Into<String>, src: Option<String>) -> Self {
        Self::new(
            target,
            Operation::Notify {
                message: NotifyPayload::Error {
                    error: error.into(),
                    src,
                },
            },
        )
    }
}

/// 本协议认识的全部 `op` 名称。
pub const KNOWN_OPS: [&str; 3] = ["download", "notify", "convertType"];

/// 入站原始消息的解析结果。
#[derive(Debug, PartialEq)]
pub enum Parsed {
    Envelope(MessageEnvelope),
    /// `target`/`op` 存在但 `op` 不认识。
    UnknownOp { target: Option<Target>, op: String },
    /// `op` 认识，但字段缺失或类型不对。
    Malformed {
        target: Option<Target>,
        op: String,
        reason: String,
    },
    /// 缺少 `target` 或 `op`，不是本协议的消息。
    Ignored,
}

/// 宽松解析入站消息。
///
/// 缺字段的消息直接忽略；`op` 不认识时保留原始名称以便记录告警；
/// `op` 认识但内容不合法时带上原因，交给调用方通知用户。
pub fn parse_envelope(value: &serde_json::Value) -> Parsed {
    let Some(op) = value.get("op").and_then(|v| v.as_str()) else {
        return Parsed::Ignored;
    };
    let Some(target_value) = value.get("target") else {
        return Parsed::Ignored;
    };
    let target = serde_json::from_value::<Target>(target_value.clone()).ok();

    match serde_json::from_value::<MessageEnvelope>(value.clone()) {
        Ok(envelope) => Parsed::Envelope(envelope),
        Err(_) if !KNOWN_OPS.contains(&op) => Parsed::UnknownOp {
            target,
            op: op.to_string(),
        },
        Err(err) => {
            log::debug!("envelope parse failed for op {}: {}", op, err);
            Parsed::Malformed {
                target,
                op: op.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// 右键菜单所在标签页的最小信息。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i64,
    pub index: i64,
}

/// 右键菜单点击事件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuClickInfo {
    pub menu_item_id: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub src_url: Option<String>,
    #[serde(default)]
    pub frame_id: Option<i64>,
}
