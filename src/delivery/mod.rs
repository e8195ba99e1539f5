//! # 交付策略
//!
//! ## 设计思路
//!
//! 重新编码发生在浏览器的渲染上下文里，后台只负责把 data URL 送过去。
//! 送达方式取决于宿主能力：
//!
//! - 支持离屏文档：`OffscreenRelay`，确保离屏页存在后广播 `convertType`
//! - 不支持：`ContentScriptRelay`，向来源页面注入共享脚本并通过专用端口发送
//!
//! 能力在宿主版本内固定，因此策略在启动时选定一次，调用侧不再分支。
//! 两种策略都遵守同一个两阶段约定：后台只发出“渲染请求”，
//! 下载由渲染面通过自己的通道独立完成，不经由端口回传结果。

mod legacy;
mod offscreen;

pub use legacy::ContentScriptRelay;
pub use offscreen::OffscreenRelay;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ExtensionConfig;
use crate::download::Downloader;
use crate::host::{ExtensionHost, HostCapabilities};
use crate::image_handler::{DataUrl, ImageError};
use crate::protocol::{ImageType, TabInfo};

/// 一次“另存为”请求，只在单次点击内存在。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source_url: String,
    pub target_type: ImageType,
    pub filename: String,
    pub frame_id: Option<i64>,
    pub tab: Option<TabInfo>,
}

/// 渲染请求的去向。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    ContentScript { tab_id: i64, frame_id: Option<i64> },
    OffscreenSurface { document_url: String },
}

/// 把 data URL 交付给渲染面（或直接下载）的方式。
#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 该请求会被送往哪里。
    fn target_for(&self, request: &ConversionRequest) -> Result<DeliveryTarget, ImageError>;

    /// 抓取之前的准备工作。
    async fn prepare(&self, _request: &ConversionRequest) -> Result<(), ImageError> {
        Ok(())
    }

    /// 交付抓取结果；格式已一致时不会触发重新编码。
    async fn deliver(&self, request: &ConversionRequest, data_url: DataUrl) -> Result<(), ImageError>;
}

/// 按宿主能力选定交付策略。
pub fn select_strategy(
    capabilities: HostCapabilities,
    host: Arc<dyn ExtensionHost>,
    downloader: Arc<Downloader>,
    config: &ExtensionConfig,
) -> Arc<dyn DeliveryStrategy> {
    let strategy: Arc<dyn DeliveryStrategy> = if capabilities.offscreen {
        Arc::new(OffscreenRelay::new(host, downloader, config.clone()))
    } else {
        Arc::new(ContentScriptRelay::new(host, config.clone()))
    };
    log::info!("🚚 交付策略：{}", strategy.name());
    strategy
}
