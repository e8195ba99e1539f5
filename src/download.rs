//! 下载入口：统一以“另存为”对话框方式交给宿主下载管理器。

use std::sync::Arc;

use crate::host::{DownloadOptions, ExtensionHost};
use crate::image_handler::{ImageError, redact_url_for_log};

pub struct Downloader {
    host: Arc<dyn ExtensionHost>,
}

impl Downloader {
    pub fn new(host: Arc<dyn ExtensionHost>) -> Self {
        Self { host }
    }

    /// 发起下载，返回宿主分配的下载 ID。
    ///
    /// 宿主拒绝（没有 ID）时返回 `ImageError::Download`，详情为宿主的 last error。
    pub async fn download(&self, url: &str, filename: &str) -> Result<i64, ImageError> {
        log::info!("💾 发起下载 - {} -> {}", redact_url_for_log(url), filename);

        let outcome = self
            .host
            .download(DownloadOptions {
                url: url.to_string(),
                filename: filename.to_string(),
                save_as: true,
            })
            .await
            .map_err(|e| ImageError::Download(e.to_string()))?;

        match outcome.id {
            Some(id) => Ok(id),
            None => Err(ImageError::Download(outcome.last_error.unwrap_or_default())),
        }
    }
}
