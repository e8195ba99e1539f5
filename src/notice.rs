//! # 用户通知
//!
//! 每个失败的请求最终只产生一条通知：本地化消息（或回显的键），
//! 可选地附上宿主错误详情与出错的来源地址。通知发出即忘。

use std::sync::Arc;

use crate::catalog::MessageCatalog;
use crate::host::ExtensionHost;
use crate::image_handler::{DataUrl, ERROR_ON_LOADING, ImageError, is_inline};
use crate::protocol::NotifyPayload;

pub struct Notifier {
    host: Arc<dyn ExtensionHost>,
    catalog: Arc<MessageCatalog>,
}

impl Notifier {
    pub fn new(host: Arc<dyn ExtensionHost>, catalog: Arc<MessageCatalog>) -> Self {
        Self { host, catalog }
    }

    /// 请求失败的统一出口。
    pub async fn notify_error(&self, error: &ImageError, source: Option<&str>) {
        log::warn!("⚠️ 请求失败：{}", error);
        let message = compose(
            &self.catalog,
            error.message_key(),
            error.detail().as_deref(),
            source,
        );
        self.host.notify(&message).await;
    }

    /// 处理渲染面发回的 `notify` 负载。
    pub async fn notify_payload(&self, payload: &NotifyPayload) {
        let message = match payload {
            NotifyPayload::Error { error, src } => compose(&self.catalog, error, None, src.as_deref()),
            NotifyPayload::Text(text) => text.clone(),
            NotifyPayload::Other(serde_json::Value::Null) => {
                compose(&self.catalog, ERROR_ON_LOADING, None, None)
            }
            NotifyPayload::Other(value) => value.to_string(),
        };
        self.host.notify(&message).await;
    }
}

/// 拼接通知正文：`<消息>[: \n<详情>][\n<来源>]`。
pub fn compose(
    catalog: &MessageCatalog,
    key: &str,
    detail: Option<&str>,
    source: Option<&str>,
) -> String {
    let mut message = catalog.message(key, &[]);
    if let Some(detail) = detail.filter(|d| !d.is_empty()) {
        message.push_str(": \n");
        message.push_str(detail);
    }
    if let Some(source) = source.filter(|s| !s.is_empty()) {
        message.push('\n');
        message.push_str(&display_source(source));
    }
    message
}

/// 通知里展示的来源：网络地址原样，data URL 只保留开头。
fn display_source(source: &str) -> String {
    if is_inline(source) {
        if let Ok(data_url) = DataUrl::parse(source) {
            return data_url.summary();
        }
    }
    source.to_string()
}
