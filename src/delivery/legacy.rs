//! 旧版宿主（无离屏文档）上的内容脚本中继。
//!
//! 点击后先把共享脚本注入来源页面/框架，抓取完成后通过专用端口把
//! `download` 或 `convertType` 发给该框架，由页面内脚本完成编码与下载。
//! 共享脚本自身保证监听只安装一次，重复注入不会产生第二个接收方。

use std::sync::Arc;

use async_trait::async_trait;

use super::{ConversionRequest, DeliveryStrategy, DeliveryTarget};
use crate::config::ExtensionConfig;
use crate::host::{ConnectOptions, ExtensionHost, HostError, ScriptInjection};
use crate::image_handler::{DataUrl, ImageError};
use crate::protocol::{MessageEnvelope, Target};

pub struct ContentScriptRelay {
    host: Arc<dyn ExtensionHost>,
    config: ExtensionConfig,
}

impl ContentScriptRelay {
    pub fn new(host: Arc<dyn ExtensionHost>, config: ExtensionConfig) -> Self {
        Self { host, config }
    }

    fn tab_id(request: &ConversionRequest) -> Result<i64, ImageError> {
        request
            .tab
            .map(|tab| tab.id)
            .ok_or_else(|| ImageError::Host(HostError::Protocol("点击事件缺少标签页信息".to_string())))
    }

    /// 子框架里的点击只注入该框架；顶层（frameId 为 0 或缺省）注入整页。
    fn frame_ids(request: &ConversionRequest) -> Option<Vec<i64>> {
        match request.frame_id {
            Some(frame_id) if frame_id != 0 => Some(vec![frame_id]),
            _ => None,
        }
    }
}

#[async_trait]
impl DeliveryStrategy for ContentScriptRelay {
    fn name(&self) -> &'static str {
        "content-script"
    }

    fn target_for(&self, request: &ConversionRequest) -> Result<DeliveryTarget, ImageError> {
        Ok(DeliveryTarget::ContentScript {
            tab_id: Self::tab_id(request)?,
            frame_id: request.frame_id,
        })
    }

    async fn prepare(&self, request: &ConversionRequest) -> Result<(), ImageError> {
        let injection = ScriptInjection {
            tab_id: Self::tab_id(request)?,
            frame_ids: Self::frame_ids(request),
            files: vec![self.config.shared_script.clone()],
        };
        log::debug!("💉 注入共享脚本：{:?}", injection);
        self.host.execute_script(injection).await?;
        Ok(())
    }

    async fn deliver(&self, request: &ConversionRequest, data_url: DataUrl) -> Result<(), ImageError> {
        let tab_id = Self::tab_id(request)?;
        let no_change = data_url.matches_type(request.target_type);

        let envelope = if no_change {
            MessageEnvelope::download(Target::Content, data_url.into_string(), request.filename.clone())
        } else {
            MessageEnvelope::convert_type(
                Target::Content,
                data_url.into_string(),
                request.target_type,
                request.filename.clone(),
            )
        };

        let port = self
            .host
            .connect_tab(
                tab_id,
                ConnectOptions {
                    name: self.config.port_name.clone(),
                    frame_id: request.frame_id,
                },
            )
            .await?;
        port.post_message(&envelope).await?;

        log::info!(
            "📨 已发送到内容脚本 - tab: {} frame: {:?} op: {}",
            tab_id,
            request.frame_id,
            if no_change { "download" } else { "convertType" }
        );
        Ok(())
    }
}
