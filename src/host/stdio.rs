//! # JSON 行协议宿主
//!
//! ## 设计思路
//!
//! 后台逻辑运行在独立进程中，浏览器侧只保留一层很薄的 JS 胶水：
//! 胶水把平台事件写入本进程 stdin，并执行本进程写到 stdout 的调用。
//!
//! ## 线格式
//!
//! ```text
//! 出站  {"call": 7, "method": "downloads.download", "params": {...}}
//! 出站  {"call": 8, "method": "page.fetchAsDataUrl", "params": {"url": "blob:..."}}
//! 出站  {"emit": "notifications.create", "params": {...}}      // 不等待回执
//! 入站  {"reply": 7, "result": {...}}  或  {"reply": 7, "error": "..."}
//! 入站  {"event": "menuClicked", "info": {...}, "tab": {...}}
//! ```
//!
//! ## 实现思路
//!
//! - 每次调用分配递增 ID，登记 `oneshot` 发送端，读循环收到 `reply` 后按 ID 唤醒。
//! - 写端由异步互斥锁保护，保证一行完整写出后才轮到下一条。
//! - 读端结束时清空挂起表，等待中的调用统一得到 `Disconnected`。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

use super::{
    ConnectOptions, CreateTab, DownloadOptions, DownloadOutcome, ExtensionHost, HostCapabilities,
    HostError, MenuItem, OffscreenDocument, Port, ScriptInjection,
};
use crate::config::ExtensionConfig;
use crate::image_handler::ImageConfig;
use crate::protocol::{MenuClickInfo, MessageEnvelope, TabInfo};

type PendingReply = oneshot::Sender<Result<Value, String>>;

/// 调用回执。
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub reply: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// 宿主启动后发送的第一条消息。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub extension_id: String,
    #[serde(default)]
    pub capabilities: HostCapabilities,
    /// 宿主预先查询好的本地化表；宿主不支持 i18n 时缺省。
    #[serde(default)]
    pub messages: Option<HashMap<String, String>>,
    #[serde(default)]
    pub config: Option<ExtensionConfig>,
    #[serde(default)]
    pub image_config: Option<ImageConfig>,
}

/// 平台事件。
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    Hello(Hello),
    Installed,
    MenuClicked {
        info: MenuClickInfo,
        #[serde(default)]
        tab: Option<TabInfo>,
    },
    Message {
        message: Value,
    },
}

/// 入站一行的解析结果。
#[derive(Debug, Clone)]
pub enum Inbound {
    Reply(Reply),
    Event(HostEvent),
}

/// 解析入站的一行 JSON。
pub fn parse_inbound(line: &str) -> Result<Inbound, HostError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| HostError::Protocol(format!("无法解析入站消息：{}", e)))?;

    if value.get("reply").is_some() {
        let reply = serde_json::from_value::<Reply>(value)
            .map_err(|e| HostError::Protocol(format!("回执格式错误：{}", e)))?;
        return Ok(Inbound::Reply(reply));
    }

    serde_json::from_value::<HostEvent>(value)
        .map(Inbound::Event)
        .map_err(|e| HostError::Protocol(format!("事件格式错误：{}", e)))
}

/// 写端与挂起调用表，宿主与端口共享。
struct Channel<W> {
    writer: tokio::sync::Mutex<W>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_id: AtomicU64,
}

impl<W> Channel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn call(&self, method: &str, params: Value) -> Result<Value, HostError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending_table()?.insert(id, tx);

        let line = json!({ "call": id, "method": method, "params": params });
        if let Err(err) = self.write_line(&line).await {
            self.pending_table()?.remove(&id);
            return Err(err);
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(HostError::Call {
                method: method.to_string(),
                message,
            }),
            Err(_) => Err(HostError::Disconnected),
        }
    }

    async fn emit(&self, method: &str, params: Value) -> Result<(), HostError> {
        self.write_line(&json!({ "emit": method, "params": params })).await
    }

    async fn write_line(&self, value: &Value) -> Result<(), HostError> {
        let mut line = serde_json::to_vec(value)
            .map_err(|e| HostError::Protocol(format!("序列化调用失败：{}", e)))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|_| HostError::Disconnected)?;
        writer.flush().await.map_err(|_| HostError::Disconnected)
    }

    fn pending_table(&self) -> Result<std::sync::MutexGuard<'_, HashMap<u64, PendingReply>>, HostError> {
        self.pending
            .lock()
            .map_err(|_| HostError::Protocol("挂起调用表锁已中毒".to_string()))
    }
}

/// 通过 JSON 行协议访问浏览器的宿主实现。
pub struct JsonLineHost<W> {
    extension_id: String,
    channel: Arc<Channel<W>>,
}

impl<W> JsonLineHost<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W, extension_id: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            channel: Arc::new(Channel {
                writer: tokio::sync::Mutex::new(writer),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// 把回执交给等待中的调用。未知 ID 返回 `false`。
    pub fn resolve(&self, reply: Reply) -> bool {
        let sender = match self.channel.pending_table() {
            Ok(mut table) => table.remove(&reply.reply),
            Err(err) => {
                log::error!("{}", err);
                return false;
            }
        };
        let Some(sender) = sender else {
            log::warn!("⚠️ 收到未知调用的回执：{}", reply.reply);
            return false;
        };

        let outcome = match reply.error {
            Some(message) => Err(message),
            None => Ok(reply.result.unwrap_or(Value::Null)),
        };
        // 调用方已放弃等待时发送失败，忽略即可
        let _ = sender.send(outcome);
        true
    }

    /// 输入流结束：所有挂起调用以 `Disconnected` 结束。
    pub fn disconnect(&self) {
        if let Ok(mut table) = self.channel.pending_table() {
            table.clear();
        }
    }

    async fn call_unit(&self, method: &str, params: Value) -> Result<(), HostError> {
        self.channel.call(method, params).await.map(|_| ())
    }
}

fn to_params<T: serde::Serialize>(value: &T) -> Result<Value, HostError> {
    serde_json::to_value(value).map_err(|e| HostError::Protocol(format!("参数序列化失败：{}", e)))
}

struct JsonLinePort<W> {
    port_id: Value,
    channel: Arc<Channel<W>>,
}

#[async_trait]
impl<W> Port for JsonLinePort<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn post_message(&self, envelope: &MessageEnvelope) -> Result<(), HostError> {
        let params = json!({ "port": self.port_id, "message": to_params(envelope)? });
        self.channel.call("port.postMessage", params).await.map(|_| ())
    }
}

#[async_trait]
impl<W> ExtensionHost for JsonLineHost<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn extension_id(&self) -> &str {
        &self.extension_id
    }

    async fn create_menu_item(&self, item: MenuItem) -> Result<(), HostError> {
        self.call_unit("contextMenus.create", to_params(&item)?).await
    }

    async fn download(&self, options: DownloadOptions) -> Result<DownloadOutcome, HostError> {
        let value = self.channel.call("downloads.download", to_params(&options)?).await?;
        if value.is_null() {
            return Ok(DownloadOutcome::default());
        }
        serde_json::from_value(value)
            .map_err(|e| HostError::Protocol(format!("下载回执格式错误：{}", e)))
    }

    async fn create_tab(&self, tab: CreateTab) -> Result<(), HostError> {
        self.call_unit("tabs.create", to_params(&tab)?).await
    }

    async fn execute_script(&self, injection: ScriptInjection) -> Result<(), HostError> {
        self.call_unit("scripting.executeScript", to_params(&injection)?).await
    }

    async fn active_documents(&self) -> Result<Vec<String>, HostError> {
        let value = self.channel.call("clients.matchAll", Value::Null).await?;
        serde_json::from_value(value)
            .map_err(|e| HostError::Protocol(format!("文档列表格式错误：{}", e)))
    }

    async fn create_offscreen_document(&self, document: OffscreenDocument) -> Result<(), HostError> {
        self.call_unit("offscreen.createDocument", to_params(&document)?).await
    }

    async fn send_message(&self, envelope: &MessageEnvelope) -> Result<(), HostError> {
        self.call_unit("runtime.sendMessage", to_params(envelope)?).await
    }

    async fn connect_tab(
        &self,
        tab_id: i64,
        options: ConnectOptions,
    ) -> Result<Box<dyn Port>, HostError> {
        let params = json!({ "tabId": tab_id, "options": to_params(&options)? });
        let port_id = self.channel.call("tabs.connect", params).await?;
        Ok(Box::new(JsonLinePort {
            port_id,
            channel: Arc::clone(&self.channel),
        }))
    }

    async fn fetch_as_data_url(&self, url: &str) -> Result<String, HostError> {
        let value = self
            .channel
            .call("page.fetchAsDataUrl", json!({ "url": url }))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| HostError::Protocol(format!("页面抓取结果格式错误：{}", e)))
    }

    async fn notify(&self, message: &str) {
        let params = json!({ "message": message });
        if let Err(err) = self.channel.emit("notifications.create", params).await {
            log::warn!("⚠️ 通知发送失败：{}", err);
        }
    }
}
