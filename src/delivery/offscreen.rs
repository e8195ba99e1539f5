//! 新版宿主上的离屏文档中继。
//!
//! 格式一致时直接下载；否则确保离屏页存在，再广播 `convertType`，
//! 离屏页完成编码后自己发 `download` 回后台。
//!
//! 离屏页的“检查后创建”是先查后做：进程内用异步互斥锁串行化，
//! 跨进程的重复创建仍依赖宿主按 URL 去重，这里只是尽力而为。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ConversionRequest, DeliveryStrategy, DeliveryTarget};
use crate::config::ExtensionConfig;
use crate::download::Downloader;
use crate::host::{ExtensionHost, OffscreenDocument};
use crate::image_handler::{DataUrl, ImageError, redact_url_for_log};
use crate::protocol::{MessageEnvelope, Target};

pub struct OffscreenRelay {
    host: Arc<dyn ExtensionHost>,
    downloader: Arc<Downloader>,
    config: ExtensionConfig,
    create_lock: Mutex<()>,
}

impl OffscreenRelay {
    pub fn new(host: Arc<dyn ExtensionHost>, downloader: Arc<Downloader>, config: ExtensionConfig) -> Self {
        Self {
            host,
            downloader,
            config,
            create_lock: Mutex::new(()),
        }
    }

    fn document_url(&self) -> String {
        self.host.runtime_url(&self.config.offscreen_document)
    }

    /// 离屏页不存在时创建。返回本次是否真的发起了创建。
    pub async fn ensure_document(&self) -> Result<bool, ImageError> {
        let _guard = self.create_lock.lock().await;
        let url = self.document_url();

        let documents = self.host.active_documents().await?;
        if documents.iter().any(|document| document == &url) {
            return Ok(false);
        }

        log::info!("🖼️ 创建离屏文档：{}", url);
        self.host
            .create_offscreen_document(OffscreenDocument {
                url,
                reasons: vec![self.config.offscreen_reason.clone()],
                justification: self.config.offscreen_justification.clone(),
            })
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl DeliveryStrategy for OffscreenRelay {
    fn name(&self) -> &'static str {
        "offscreen"
    }

    fn target_for(&self, _request: &ConversionRequest) -> Result<DeliveryTarget, ImageError> {
        Ok(DeliveryTarget::OffscreenSurface {
            document_url: self.document_url(),
        })
    }

    async fn deliver(&self, request: &ConversionRequest, data_url: DataUrl) -> Result<(), ImageError> {
        if data_url.matches_type(request.target_type) {
            log::info!("⏩ 格式一致，直接下载：{}", request.filename);
            self.downloader
                .download(data_url.as_str(), &request.filename)
                .await?;
            return Ok(());
        }

        self.ensure_document().await?;
        let envelope = MessageEnvelope::convert_type(
            Target::Offscreen,
            data_url.into_string(),
            request.target_type,
            request.filename.clone(),
        );
        self.host.send_message(&envelope).await?;
        log::info!(
            "📨 已发送到离屏文档 - {} -> {}",
            redact_url_for_log(&request.source_url),
            request.target_type
        );
        Ok(())
    }
}
