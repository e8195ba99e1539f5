//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载“抓取 → 解码 → 编码 → 交付”链路中的所有错误来源，
//! 每个分支都能映射到一个面向用户的消息键，最终只产生一条通知。

use crate::host::HostError;

/// 通知中使用的消息键。
pub const ERROR_ON_LOADING: &str = "errorOnLoading";
pub const ERROR_ON_SAVING: &str = "errorOnSaving";
pub const ERROR_IS_NOT_IMAGE: &str = "errorIsNotImage";

/// 图片转换统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// 网络层失败或抓取到 0 字节。
    #[error("抓取失败：{0}")]
    Fetch(String),

    /// 右键目标不是图片，或者没有可用的来源地址。
    #[error("右键目标不是图片")]
    NotAnImage,

    /// 宿主拒绝或执行下载失败。
    #[error("下载失败：{0}")]
    Download(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    /// 来源格式无法在进程内栅格化（如 SVG 矢量图）。
    #[error("不支持的来源格式：{0}")]
    UnsupportedSource(String),

    #[error("宿主错误：{0}")]
    Host(#[from] HostError),
}

impl ImageError {
    /// 该错误对应的本地化消息键。
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::NotAnImage => ERROR_IS_NOT_IMAGE,
            Self::Download(_) | Self::Host(_) => ERROR_ON_SAVING,
            Self::Fetch(_)
            | Self::Decode(_)
            | Self::Encode(_)
            | Self::InvalidFormat(_)
            | Self::ResourceLimit(_)
            | Self::UnsupportedSource(_) => ERROR_ON_LOADING,
        }
    }

    /// 附加在通知里的详情；`NotAnImage` 没有额外信息。
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::NotAnImage => None,
            Self::Fetch(msg)
            | Self::Download(msg)
            | Self::Decode(msg)
            | Self::Encode(msg)
            | Self::InvalidFormat(msg)
            | Self::ResourceLimit(msg)
            | Self::UnsupportedSource(msg) => Some(msg.clone()),
            Self::Host(err) => Some(err.to_string()),
        }
    }
}
