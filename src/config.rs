//! # 扩展级配置
//!
//! 资源路径、商店地址模板、离屏文档创建参数等与浏览器侧约定的常量。
//! 生产环境直接使用 `Default`；宿主可以在 `hello` 握手中整体覆盖。

use serde::{Deserialize, Serialize};

/// 商店地址模板中扩展 ID 的占位符。
pub const EXTENSION_ID_PLACEHOLDER: &str = "{extension_id}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionConfig {
    /// 离屏文档页面（相对扩展根目录）。
    pub offscreen_document: String,
    /// 旧版宿主上注入的内容脚本；与离屏页面共用同一份脚本。
    pub shared_script: String,
    /// “在商店中查看”打开的地址模板。
    pub store_url_template: String,
    pub offscreen_reason: String,
    pub offscreen_justification: String,
    /// 旧版宿主上打开端口时使用的名称。
    pub port_name: String,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            offscreen_document: "offscreen.html".to_string(),
            shared_script: "offscreen.js".to_string(),
            store_url_template:
                "https://chrome.google.com/webstore/detail/save-image-as-type/{extension_id}"
                    .to_string(),
            offscreen_reason: "DOM_SCRAPING".to_string(),
            offscreen_justification: "Download a image for user".to_string(),
            port_name: "convertType".to_string(),
        }
    }
}

impl ExtensionConfig {
    /// 生成指定扩展的商店地址。
    pub fn store_url(&self, extension_id: &str) -> String {
        self.store_url_template
            .replace(EXTENSION_ID_PLACEHOLDER, extension_id)
    }
}
