//! # 菜单与事件前端
//!
//! ## 设计思路
//!
//! 只做平台事件到核心流程的接线，不承载业务逻辑：
//!
//! - 安装：注册三个格式菜单、分隔线与“在商店中查看”
//! - 入站消息：只处理发给后台的 `download` / `notify`，未知 `op` 记录告警
//! - 菜单点击：另存为走 文件名推导 → 准备 → 抓取 → 交付；商店项打开新标签页
//!
//! 每个请求独立执行到终态：发起下载，或弹出一条通知。不做自动重试。

use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{MessageCatalog, SAVE_AS, VIEW_IN_STORE};
use crate::config::ExtensionConfig;
use crate::delivery::{ConversionRequest, DeliveryStrategy};
use crate::download::Downloader;
use crate::filename::derive_filename;
use crate::host::{CreateTab, ExtensionHost, MenuItem, MenuItemKind};
use crate::image_handler::{ImageError, ImageHandler, redact_url_for_log};
use crate::notice::Notifier;
use crate::protocol::{
    ImageType, MenuClickInfo, MessageEnvelope, Operation, Parsed, SEPARATOR_ID, TabInfo, Target,
    VIEW_IN_STORE_ID, parse_envelope,
};

const IMAGE_CONTEXT: &str = "image";

/// 后台服务：持有全部组件，供事件循环并发调用。
pub struct Background {
    host: Arc<dyn ExtensionHost>,
    catalog: Arc<MessageCatalog>,
    images: Arc<ImageHandler>,
    strategy: Arc<dyn DeliveryStrategy>,
    downloader: Arc<Downloader>,
    notifier: Notifier,
    config: ExtensionConfig,
}

impl Background {
    pub fn new(
        host: Arc<dyn ExtensionHost>,
        catalog: Arc<MessageCatalog>,
        images: Arc<ImageHandler>,
        strategy: Arc<dyn DeliveryStrategy>,
        downloader: Arc<Downloader>,
        config: ExtensionConfig,
    ) -> Self {
        let notifier = Notifier::new(host.clone(), catalog.clone());
        Self {
            host,
            catalog,
            images,
            strategy,
            downloader,
            notifier,
            config,
        }
    }

    /// 安装事件：注册右键菜单。
    pub async fn on_installed(&self) {
        self.catalog.load_messages();

        let mut items: Vec<MenuItem> = ImageType::ALL
            .into_iter()
            .map(|image_type| MenuItem {
                id: image_type.menu_id(),
                title: Some(self.catalog.message(SAVE_AS, &[image_type.label()])),
                kind: MenuItemKind::Normal,
                contexts: vec![IMAGE_CONTEXT.to_string()],
            })
            .collect();
        items.push(MenuItem {
            id: SEPARATOR_ID.to_string(),
            title: None,
            kind: MenuItemKind::Separator,
            contexts: vec![IMAGE_CONTEXT.to_string()],
        });
        items.push(MenuItem {
            id: VIEW_IN_STORE_ID.to_string(),
            title: Some(self.catalog.message(VIEW_IN_STORE, &[])),
            kind: MenuItemKind::Normal,
            contexts: vec![IMAGE_CONTEXT.to_string()],
        });

        for item in items {
            let id = item.id.clone();
            if let Err(err) = self.host.create_menu_item(item).await {
                log::warn!("⚠️ 菜单项 {} 创建失败：{}", id, err);
            }
        }
        log::info!("📋 右键菜单注册完成");
    }

    /// 入站运行时消息；只处理发给后台的部分。
    pub async fn on_message(&self, message: &serde_json::Value) {
        match parse_envelope(message) {
            Parsed::Envelope(envelope) if envelope.target == Target::Background => {
                self.dispatch(envelope).await;
            }
            Parsed::UnknownOp {
                target: Some(Target::Background),
                op,
            } => {
                log::warn!("unknown op: {}", op);
            }
            Parsed::Malformed {
                target: Some(Target::Background),
                op,
                reason,
            } => {
                self.report_malformed(&op, reason).await;
            }
            _ => {}
        }
    }

    /// 认识的 `op` 但内容不合法：记录告警并按操作类型弹出对应的失败通知。
    pub async fn report_malformed(&self, op: &str, reason: String) {
        log::warn!("⚠️ 消息格式错误 {}：{}", op, reason);
        let error = if op == "download" {
            ImageError::Download(reason)
        } else {
            ImageError::InvalidFormat(reason)
        };
        self.notifier.notify_error(&error, None).await;
    }

    async fn dispatch(&self, envelope: MessageEnvelope) {
        match envelope.op {
            Operation::Download { src, filename, .. } => {
                if let Err(err) = self.downloader.download(&src, &filename).await {
                    self.notifier.notify_error(&err, None).await;
                }
            }
            Operation::Notify { message } => {
                self.notifier.notify_payload(&message).await;
            }
            Operation::ConvertType { .. } => {
                log::warn!("unknown op: convertType");
            }
        }
    }

    /// 右键菜单点击。
    pub async fn on_menu_clicked(&self, info: MenuClickInfo, tab: Option<TabInfo>) {
        if let Some(target_type) = ImageType::from_menu_id(&info.menu_item_id) {
            self.save_as(info, tab, target_type).await;
            return;
        }
        if info.menu_item_id == VIEW_IN_STORE_ID {
            self.view_in_store(tab).await;
            return;
        }
        log::debug!("忽略未知菜单项：{}", info.menu_item_id);
    }

    async fn save_as(&self, info: MenuClickInfo, tab: Option<TabInfo>, target_type: ImageType) {
        let source_url = match (info.media_type.as_deref(), info.src_url) {
            (Some(IMAGE_CONTEXT), Some(src)) if !src.is_empty() => src,
            _ => {
                self.notifier.notify_error(&ImageError::NotAnImage, None).await;
                return;
            }
        };

        let request = ConversionRequest {
            filename: derive_filename(&source_url, target_type.as_str()),
            source_url,
            target_type,
            frame_id: info.frame_id,
            tab,
        };
        self.catalog.load_messages();

        if let Err(err) = self.convert(&request).await {
            self.notifier
                .notify_error(&err, Some(&request.source_url))
                .await;
        }
    }

    /// 单个请求的主流程：准备 → 抓取 → 交付。
    pub async fn convert(&self, request: &ConversionRequest) -> Result<(), ImageError> {
        let start = Instant::now();
        let target = self.strategy.target_for(request)?;
        log::info!(
            "🖱️ 另存为 {} - {} -> {}（{:?}）",
            request.target_type.label(),
            redact_url_for_log(&request.source_url),
            request.filename,
            target
        );

        self.strategy.prepare(request).await?;
        let data_url = self.images.fetch_as_data_url(&request.source_url).await?;
        let fetched_at = start.elapsed();
        self.strategy.deliver(request, data_url).await?;

        log::info!(
            "✅ 请求已交付 - fetch={}ms total={}ms",
            fetched_at.as_millis(),
            start.elapsed().as_millis()
        );
        Ok(())
    }

    async fn view_in_store(&self, tab: Option<TabInfo>) {
        let url = self.config.store_url(self.host.extension_id());
        let index = tab.map(|tab| tab.index + 1).unwrap_or(0);
        if let Err(err) = self.host.create_tab(CreateTab { url, index }).await {
            log::warn!("⚠️ 打开商店页面失败：{}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableLocalizer;
    use crate::delivery::select_strategy;
    use crate::host::HostCapabilities;
    use crate::host::memory::{HostCall, MemoryHost};
    use crate::image_handler::{Fetch, FetchedBody, ImageConfig};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    struct FixedFetcher;

    #[async_trait]
    impl Fetch for FixedFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedBody, ImageError> {
            if url.contains("offline") {
                return Err(ImageError::Fetch("connection refused".to_string()));
            }
            Ok(FetchedBody {
                bytes: bytes::Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
                content_type: Some("image/png".to_string()),
            })
        }
    }

    fn background(host: &MemoryHost, offscreen: bool, messages: Option<HashMap<String, String>>) -> Background {
        let shared: Arc<dyn ExtensionHost> = Arc::new(host.clone());
        let config = ExtensionConfig::default();
        let catalog = Arc::new(MessageCatalog::new(Arc::new(TableLocalizer::new(messages))));
        let images = Arc::new(ImageHandler::with_fetcher(
            ImageConfig::default(),
            Arc::new(FixedFetcher),
        ));
        let downloader = Arc::new(Downloader::new(shared.clone()));
        let strategy = select_strategy(
            HostCapabilities { offscreen },
            shared.clone(),
            downloader.clone(),
            &config,
        );
        Background::new(shared, catalog, images, strategy, downloader, config)
    }

    fn click(menu_item_id: &str, src_url: Option<&str>) -> MenuClickInfo {
        MenuClickInfo {
            menu_item_id: menu_item_id.to_string(),
            media_type: Some("image".to_string()),
            src_url: src_url.map(str::to_string),
            frame_id: None,
        }
    }

    #[tokio::test]
    async fn installed_registers_five_menu_items_in_order() {
        let host = MemoryHost::new("ext");
        let mut table = HashMap::new();
        table.insert("Save_as".to_string(), "另存为 $1".to_string());
        table.insert("View_in_store".to_string(), "在商店中查看".to_string());

        background(&host, true, Some(table)).on_installed().await;

        let items: Vec<MenuItem> = host
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::CreateMenuItem(item) => Some(item),
                _ => None,
            })
            .collect();
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["save_as_jpg", "save_as_png", "save_as_webp", "sep_1", "view_in_store"]
        );
        assert_eq!(items[2].title.as_deref(), Some("另存为 WebP"));
        assert_eq!(items[3].kind, MenuItemKind::Separator);
        assert_eq!(items[4].title.as_deref(), Some("在商店中查看"));
        assert!(items.iter().all(|item| item.contexts == vec!["image".to_string()]));
    }

    #[tokio::test]
    async fn installed_without_i18n_uses_fallback_titles() {
        let host = MemoryHost::new("ext");

        background(&host, true, None).on_installed().await;

        let titles: Vec<Option<String>> = host
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::CreateMenuItem(item) => Some(item.title),
                _ => None,
            })
            .collect();
        assert_eq!(titles[0].as_deref(), Some("Save as JPG"));
        assert_eq!(titles[4].as_deref(), Some("View in store"));
    }

    #[tokio::test]
    async fn click_without_source_notifies_not_an_image() {
        let host = MemoryHost::new("ext");

        background(&host, true, None)
            .on_menu_clicked(click("save_as_png", None), None)
            .await;

        assert_eq!(host.notifications(), vec!["errorIsNotImage".to_string()]);
        assert!(host.downloads().is_empty());
    }

    #[tokio::test]
    async fn click_on_non_image_media_notifies_not_an_image() {
        let host = MemoryHost::new("ext");
        let mut info = click("save_as_png", Some("https://example.com/a.mp4"));
        info.media_type = Some("video".to_string());

        background(&host, true, None).on_menu_clicked(info, None).await;

        assert_eq!(host.notifications(), vec!["errorIsNotImage".to_string()]);
    }

    #[tokio::test]
    async fn same_format_click_downloads_directly() {
        let host = MemoryHost::new("ext");

        background(&host, true, None)
            .on_menu_clicked(click("save_as_png", Some("https://example.com/cat.png")), None)
            .await;

        let downloads = host.downloads();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].filename, "cat.png");
        assert!(downloads[0].url.starts_with("data:image/png;base64,"));
        assert!(host.notifications().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_notifies_with_source() {
        let host = MemoryHost::new("ext");

        background(&host, true, None)
            .on_menu_clicked(click("save_as_jpg", Some("https://offline.example.com/a.png")), None)
            .await;

        assert_eq!(
            host.notifications(),
            vec!["errorOnLoading: \nconnection refused\nhttps://offline.example.com/a.png".to_string()]
        );
    }

    #[tokio::test]
    async fn view_in_store_opens_tab_next_to_current() {
        let host = MemoryHost::new("abcdef");

        background(&host, true, None)
            .on_menu_clicked(click("view_in_store", None), Some(TabInfo { id: 7, index: 2 }))
            .await;

        assert_eq!(
            host.calls(),
            vec![HostCall::CreateTab(CreateTab {
                url: "https://chrome.google.com/webstore/detail/save-image-as-type/abcdef".to_string(),
                index: 3,
            })]
        );
    }

    #[tokio::test]
    async fn unknown_menu_item_is_ignored() {
        let host = MemoryHost::new("ext");

        background(&host, true, None)
            .on_menu_clicked(click("save_as_gif", Some("https://example.com/a.gif")), None)
            .await;

        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn background_download_message_starts_download() {
        let host = MemoryHost::new("ext");

        background(&host, true, None)
            .on_message(&json!({
                "target": "background",
                "op": "download",
                "url": "data:image/webp;base64,AAAA",
                "filename": "a.webp",
            }))
            .await;

        let downloads = host.downloads();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].url, "data:image/webp;base64,AAAA");
        assert_eq!(downloads[0].filename, "a.webp");
    }

    #[tokio::test]
    async fn refused_download_message_notifies_saving_error() {
        let host = MemoryHost::new("ext");
        host.refuse_downloads("Invalid filename");

        background(&host, true, None)
            .on_message(&json!({
                "target": "background",
                "op": "download",
                "url": "data:image/webp;base64,AAAA",
                "filename": "a.webp",
            }))
            .await;

        assert_eq!(
            host.notifications(),
            vec!["errorOnSaving: \nInvalid filename".to_string()]
        );
    }

    #[tokio::test]
    async fn notify_messages_of_any_shape_reach_the_user() {
        let host = MemoryHost::new("ext");
        let background = background(&host, true, None);

        background
            .on_message(&json!({
                "target": "background",
                "op": "notify",
                "message": { "text": "quota exceeded" },
            }))
            .await;
        background
            .on_message(&json!({ "target": "background", "op": "notify" }))
            .await;

        assert_eq!(
            host.notifications(),
            vec![
                r#"{"text":"quota exceeded"}"#.to_string(),
                "errorOnLoading".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn malformed_download_message_notifies_saving_error() {
        let host = MemoryHost::new("ext");

        background(&host, true, None)
            .on_message(&json!({
                "target": "background",
                "op": "download",
                "url": "data:image/png;base64,AAAA",
            }))
            .await;

        let notifications = host.notifications();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].starts_with("errorOnSaving: \n"));
        assert!(host.downloads().is_empty());
    }

    #[tokio::test]
    async fn messages_for_other_targets_are_ignored() {
        let host = MemoryHost::new("ext");
        let background = background(&host, true, None);

        background
            .on_message(&json!({
                "target": "offscreen",
                "op": "download",
                "src": "data:image/png;base64,AAAA",
                "filename": "a.png",
            }))
            .await;
        background
            .on_message(&json!({ "target": "background", "op": "explode" }))
            .await;

        assert!(host.calls().is_empty());
    }
}
