//! # 图片处理模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块负责转换链路中与像素、字节相关的全部工作，按职责拆分为多个子模块：
//!
//! - `handler`：`ImageHandler` 本体（配置 + 抓取实现）
//! - `loader`：抓取与编码桥，任意来源 → data URL
//! - `pipeline`：解码、资源限制、按目标格式重新编码
//! - `config/error/source`：配置、错误、data URL 模型
//!
//! ## 调用链
//!
//! ```text
//! 右键菜单点击（front）
//!    ↓
//! loader.rs（fetch_as_data_url：内联直通 / 网络或页面内抓取 + 0 字节校验）
//!    ↓
//! delivery（格式一致直接下载，否则交给渲染面）
//!    ↓
//! surface → pipeline.rs（reencode：解码 + 限制 + 编码）
//!    ↓
//! 下载
//! ```

mod config;
mod error;
mod handler;
mod loader;
mod pipeline;
mod source;

pub use config::ImageConfig;
pub use error::{ERROR_IS_NOT_IMAGE, ERROR_ON_LOADING, ERROR_ON_SAVING, ImageError};
pub use handler::ImageHandler;
pub use loader::{Fetch, FetchedBody, HttpFetcher, PageFetcher};
pub use source::{DataUrl, is_inline};

pub(crate) use loader::redact_url_for_log;
