//! # 宿主运行时接口
//!
//! ## 设计思路
//!
//! 扩展后台依赖的平台能力（菜单、下载、标签页、脚本注入、离屏文档、运行时消息、
//! 页面内抓取、通知）全部收敛到 `ExtensionHost` trait，核心逻辑只面向 trait 编程：
//!
//! - `stdio`：生产实现，通过标准输入输出上的 JSON 行协议与 JS 胶水层通信
//! - `memory`：内存实现，记录所有调用，供测试与离线演练使用
//!
//! 国际化查询是同步的，单独抽成 `Localizer`，由消息目录持有。

pub mod memory;
pub mod stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::protocol::MessageEnvelope;

/// 宿主调用错误。
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("宿主调用失败 {method}：{message}")]
    Call { method: String, message: String },

    #[error("宿主连接已断开")]
    Disconnected,

    #[error("宿主协议错误：{0}")]
    Protocol(String),
}

/// 宿主能力开关，随宿主版本固定。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// 是否支持离屏文档（offscreen API）。
    #[serde(default)]
    pub offscreen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuItemKind {
    Normal,
    Separator,
}

/// 右键菜单项定义。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: MenuItemKind,
    pub contexts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    pub url: String,
    pub filename: String,
    pub save_as: bool,
}

/// 下载调用结果：`id` 为空表示宿主拒绝，`last_error` 为宿主附带的错误详情。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTab {
    pub url: String,
    pub index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptInjection {
    pub tab_id: i64,
    /// `None` 表示注入到标签页顶层文档。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_ids: Option<Vec<i64>>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffscreenDocument {
    pub url: String,
    pub reasons: Vec<String>,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
}

/// 与某个标签页/框架之间的专用消息通道。
#[async_trait]
pub trait Port: Send + Sync {
    async fn post_message(&self, envelope: &MessageEnvelope) -> Result<(), HostError>;
}

/// 扩展宿主提供的平台能力。
#[async_trait]
pub trait ExtensionHost: Send + Sync {
    fn extension_id(&self) -> &str;

    /// 扩展包内资源的绝对地址。
    fn runtime_url(&self, path: &str) -> String {
        format!(
            "chrome-extension://{}/{}",
            self.extension_id(),
            path.trim_start_matches('/')
        )
    }

    async fn create_menu_item(&self, item: MenuItem) -> Result<(), HostError>;

    async fn download(&self, options: DownloadOptions) -> Result<DownloadOutcome, HostError>;

    async fn create_tab(&self, tab: CreateTab) -> Result<(), HostError>;

    async fn execute_script(&self, injection: ScriptInjection) -> Result<(), HostError>;

    /// 列出当前活跃的扩展文档（service worker clients）地址。
    async fn active_documents(&self) -> Result<Vec<String>, HostError>;

    async fn create_offscreen_document(&self, document: OffscreenDocument) -> Result<(), HostError>;

    /// 广播运行时消息，由宿主按 `target` 投递。
    async fn send_message(&self, envelope: &MessageEnvelope) -> Result<(), HostError>;

    async fn connect_tab(
        &self,
        tab_id: i64,
        options: ConnectOptions,
    ) -> Result<Box<dyn Port>, HostError>;

    /// 在页面环境里读取只对页面可见的地址（`blob:`、`filesystem:` 等），
    /// 以 data URL 形式返回内容。
    async fn fetch_as_data_url(&self, url: &str) -> Result<String, HostError>;

    /// 弹出用户可见通知。发出即忘，失败不向上传递。
    async fn notify(&self, message: &str);
}

/// 宿主的本地化查询。
pub trait Localizer: Send + Sync {
    /// 宿主是否具备原生本地化能力；不具备时消息目录走内置兜底表。
    fn supports_i18n(&self) -> bool;

    fn get_message(&self, key: &str, args: &[&str]) -> Option<String>;
}
