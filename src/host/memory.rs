//! 内存宿主：不接真实浏览器，只记录调用序列。
//!
//! 离屏文档列表、下载结果等可以预先设定，用来驱动各条分支。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    ConnectOptions, CreateTab, DownloadOptions, DownloadOutcome, ExtensionHost, HostError,
    MenuItem, OffscreenDocument, Port, ScriptInjection,
};
use crate::protocol::MessageEnvelope;

/// 被记录下来的一次宿主调用。
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    CreateMenuItem(MenuItem),
    Download(DownloadOptions),
    CreateTab(CreateTab),
    ExecuteScript(ScriptInjection),
    ActiveDocuments,
    CreateOffscreenDocument(OffscreenDocument),
    SendMessage(MessageEnvelope),
    ConnectTab { tab_id: i64, options: ConnectOptions },
    PortMessage { tab_id: i64, envelope: MessageEnvelope },
    FetchAsDataUrl(String),
    Notify(String),
}

#[derive(Default)]
struct MemoryState {
    calls: Vec<HostCall>,
    documents: Vec<String>,
    next_download_id: i64,
    refuse_downloads: Option<String>,
    page_data: HashMap<String, String>,
}

/// 记录型内存宿主。
#[derive(Clone)]
pub struct MemoryHost {
    extension_id: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHost {
    pub fn new(extension_id: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            state: Arc::new(Mutex::new(MemoryState {
                next_download_id: 1,
                ..MemoryState::default()
            })),
        }
    }

    /// 预置一个已存在的活跃文档地址。
    pub fn with_document(self, url: impl Into<String>) -> Self {
        self.lock().documents.push(url.into());
        self
    }

    /// 预置页面内地址对应的 data URL；未预置的地址读取失败。
    pub fn with_page_data(self, url: impl Into<String>, data_url: impl Into<String>) -> Self {
        self.lock().page_data.insert(url.into(), data_url.into());
        self
    }

    /// 之后的下载全部被拒绝，并附带给定的 last error。
    pub fn refuse_downloads(&self, last_error: impl Into<String>) {
        self.lock().refuse_downloads = Some(last_error.into());
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.lock().calls.clone()
    }

    pub fn downloads(&self) -> Vec<DownloadOptions> {
        self.filter(|call| match call {
            HostCall::Download(options) => Some(options.clone()),
            _ => None,
        })
    }

    pub fn notifications(&self) -> Vec<String> {
        self.filter(|call| match call {
            HostCall::Notify(message) => Some(message.clone()),
            _ => None,
        })
    }

    pub fn sent_messages(&self) -> Vec<MessageEnvelope> {
        self.filter(|call| match call {
            HostCall::SendMessage(envelope) => Some(envelope.clone()),
            _ => None,
        })
    }

    pub fn port_messages(&self) -> Vec<MessageEnvelope> {
        self.filter(|call| match call {
            HostCall::PortMessage { envelope, .. } => Some(envelope.clone()),
            _ => None,
        })
    }

    pub fn count(&self, predicate: impl Fn(&HostCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    fn filter<T>(&self, pick: impl Fn(&HostCall) -> Option<T>) -> Vec<T> {
        self.lock().calls.iter().filter_map(pick).collect()
    }

    fn record(&self, call: HostCall) {
        self.lock().calls.push(call);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // 测试线程 panic 后仍需能读取记录
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct MemoryPort {
    tab_id: i64,
    host: MemoryHost,
}

#[async_trait]
impl Port for MemoryPort {
    async fn post_message(&self, envelope: &MessageEnvelope) -> Result<(), HostError> {
        self.host.record(HostCall::PortMessage {
            tab_id: self.tab_id,
            envelope: envelope.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl ExtensionHost for MemoryHost {
    fn extension_id(&self) -> &str {
        &self.extension_id
    }

    async fn create_menu_item(&self, item: MenuItem) -> Result<(), HostError> {
        self.record(HostCall::CreateMenuItem(item));
        Ok(())
    }

    async fn download(&self, options: DownloadOptions) -> Result<DownloadOutcome, HostError> {
        self.record(HostCall::Download(options));
        let mut state = self.lock();
        if let Some(last_error) = state.refuse_downloads.clone() {
            return Ok(DownloadOutcome {
                id: None,
                last_error: Some(last_error),
            });
        }
        let id = state.next_download_id;
        state.next_download_id += 1;
        Ok(DownloadOutcome {
            id: Some(id),
            last_error: None,
        })
    }

    async fn create_tab(&self, tab: CreateTab) -> Result<(), HostError> {
        self.record(HostCall::CreateTab(tab));
        Ok(())
    }

    async fn execute_script(&self, injection: ScriptInjection) -> Result<(), HostError> {
        self.record(HostCall::ExecuteScript(injection));
        Ok(())
    }

    async fn active_documents(&self) -> Result<Vec<String>, HostError> {
        self.record(HostCall::ActiveDocuments);
        Ok(self.lock().documents.clone())
    }

    async fn create_offscreen_document(&self, document: OffscreenDocument) -> Result<(), HostError> {
        let mut state = self.lock();
        state.documents.push(document.url.clone());
        state.calls.push(HostCall::CreateOffscreenDocument(document));
        Ok(())
    }

    async fn send_message(&self, envelope: &MessageEnvelope) -> Result<(), HostError> {
        self.record(HostCall::SendMessage(envelope.clone()));
        Ok(())
    }

    async fn connect_tab(
        &self,
        tab_id: i64,
        options: ConnectOptions,
    ) -> Result<Box<dyn Port>, HostError> {
        self.record(HostCall::ConnectTab { tab_id, options });
        Ok(Box::new(MemoryPort {
            tab_id,
            host: self.clone(),
        }))
    }

    async fn fetch_as_data_url(&self, url: &str) -> Result<String, HostError> {
        let mut state = self.lock();
        state.calls.push(HostCall::FetchAsDataUrl(url.to_string()));
        state.page_data.get(url).cloned().ok_or_else(|| HostError::Call {
            method: "page.fetchAsDataUrl".to_string(),
            message: format!("无法读取 {}", url),
        })
    }

    async fn notify(&self, message: &str) {
        self.record(HostCall::Notify(message.to_string()));
    }
}
