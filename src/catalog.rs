//! # 本地化消息目录
//!
//! ## 设计思路
//!
//! 通知与菜单标题用到的字符串都来自宿主的 i18n。目录在首次访问时按固定键表
//! 查询一次并缓存，之后只读，可被任意并发请求共享。
//!
//! 部分旧宿主在后台上下文里没有 i18n，此时退回内置兜底表：
//! 只认识 `View_in_store` 与带一个参数的 `Save_as`，其余键原样回显。

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use crate::host::Localizer;
use crate::image_handler::{ERROR_IS_NOT_IMAGE, ERROR_ON_LOADING, ERROR_ON_SAVING};

pub const VIEW_IN_STORE: &str = "View_in_store";
pub const SAVE_AS: &str = "Save_as";

/// 首次加载时预取的消息键。
pub const PRELOADED_KEYS: [&str; 4] = [
    ERROR_ON_SAVING,
    ERROR_ON_LOADING,
    ERROR_IS_NOT_IMAGE,
    VIEW_IN_STORE,
];

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([1-9])").expect("valid regex"));

/// 进程级消息目录。
pub struct MessageCatalog {
    localizer: Arc<dyn Localizer>,
    cache: OnceCell<HashMap<String, String>>,
}

impl MessageCatalog {
    pub fn new(localizer: Arc<dyn Localizer>) -> Self {
        Self {
            localizer,
            cache: OnceCell::new(),
        }
    }

    /// 首次调用时填充缓存，之后返回同一份映射，不再查询宿主。
    pub fn load_messages(&self) -> &HashMap<String, String> {
        self.cache.get_or_init(|| {
            log::debug!("🌍 加载本地化消息（{} 个键）", PRELOADED_KEYS.len());
            PRELOADED_KEYS
                .iter()
                .map(|key| (key.to_string(), self.lookup(key, &[])))
                .collect()
        })
    }

    /// 解析任意消息键；无参数的预取键直接命中缓存。
    pub fn message(&self, key: &str, args: &[&str]) -> String {
        if args.is_empty() {
            if let Some(cached) = self.load_messages().get(key) {
                return cached.clone();
            }
        }
        self.lookup(key, args)
    }

    fn lookup(&self, key: &str, args: &[&str]) -> String {
        if !self.localizer.supports_i18n() {
            return fallback_message(key, args);
        }
        match self.localizer.get_message(key, args) {
            Some(message) if !message.is_empty() => message,
            _ => key.to_string(),
        }
    }
}

/// 宿主不支持 i18n 时的内置兜底。
fn fallback_message(key: &str, args: &[&str]) -> String {
    match (key, args.first()) {
        (VIEW_IN_STORE, _) => "View in store".to_string(),
        (SAVE_AS, Some(format)) => format!("Save as {}", format),
        _ => key.to_string(),
    }
}

/// 用位置参数替换 `$1`..`$9` 占位符，缺失的参数替换为空串。
pub fn substitute_placeholders(template: &str, args: &[&str]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| args.get(n - 1))
                .map(|arg| arg.to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

/// 由宿主在握手时下发的本地化表；表缺失即视为宿主不支持 i18n。
pub struct TableLocalizer {
    messages: Option<HashMap<String, String>>,
}

impl TableLocalizer {
    pub fn new(messages: Option<HashMap<String, String>>) -> Self {
        Self { messages }
    }
}

impl Localizer for TableLocalizer {
    fn supports_i18n(&self) -> bool {
        self.messages.is_some()
    }

    fn get_message(&self, key: &str, args: &[&str]) -> Option<String> {
        let template = self.messages.as_ref()?.get(key)?;
        Some(substitute_placeholders(template, args))
    }
}
