//! # 核心处理器
//!
//! `ImageHandler` 持有配置与抓取实现，本身无可变状态，可被多个请求并发共享。
//! 网络地址走 `fetcher`，只在页面内有效的地址走可选的 `page_fetcher`。
//! 抓取桥见 `loader`，重新编码见 `pipeline`。

use std::sync::Arc;

use super::loader::{Fetch, HttpFetcher, PageFetcher};
use super::{ImageConfig, ImageError};
use crate::host::ExtensionHost;

/// 图片处理器。
pub struct ImageHandler {
    pub(super) config: ImageConfig,
    pub(super) fetcher: Arc<dyn Fetch>,
    pub(super) page_fetcher: Option<Arc<dyn Fetch>>,
}

impl ImageHandler {
    /// 根据配置创建处理器，网络层使用复用型 HTTP 客户端。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use save_image_as_type::image_handler::{ImageConfig, ImageHandler};
    ///
    /// let handler = ImageHandler::new(ImageConfig::default())?;
    /// # Ok::<(), save_image_as_type::image_handler::ImageError>(())
    /// ```
    pub fn new(config: ImageConfig) -> Result<Self, ImageError> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// 注入自定义抓取实现。
    pub fn with_fetcher(config: ImageConfig, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            config,
            fetcher,
            page_fetcher: None,
        }
    }

    /// 挂上页面内抓取实现，用于 `blob:` 等非网络来源。
    pub fn with_page_fetcher(mut self, page_fetcher: Arc<dyn Fetch>) -> Self {
        self.page_fetcher = Some(page_fetcher);
        self
    }

    /// 以宿主作为页面内抓取通道。
    pub fn with_page_host(self, host: Arc<dyn ExtensionHost>) -> Self {
        let page_fetcher = Arc::new(PageFetcher::new(host, &self.config));
        self.with_page_fetcher(page_fetcher)
    }
}
