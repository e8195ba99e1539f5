//! # 服务装配与事件循环
//!
//! ## 设计思路
//!
//! 进程启动后先读握手（`hello`），据此确定扩展 ID、宿主能力、本地化表与配置覆盖，
//! 然后装配全部组件，进入读循环：
//!
//! - `reply` 行交给宿主唤醒对应的挂起调用
//! - 事件行各自派生一个任务，读循环本身从不等待处理结果
//!
//! 输入流结束即服务结束，挂起调用统一以断开告终。
//!
//! ## 实现思路
//!
//! 组件装配抽成 `Extension::assemble`，生产路径与集成测试共用同一套接线，
//! 测试只是把宿主换成内存实现。

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, Lines};

use crate::catalog::{MessageCatalog, TableLocalizer};
use crate::config::ExtensionConfig;
use crate::delivery::select_strategy;
use crate::download::Downloader;
use crate::error::AppError;
use crate::front::Background;
use crate::host::stdio::{Hello, HostEvent, Inbound, JsonLineHost, parse_inbound};
use crate::host::{ExtensionHost, HostCapabilities, Localizer};
use crate::image_handler::ImageHandler;
use crate::protocol::{Parsed, Target, parse_envelope};
use crate::surface::RenderSurface;

/// 装配完成的扩展：后台与渲染面共享同一个宿主和图片处理器。
pub struct Extension {
    background: Background,
    surface: RenderSurface,
}

impl Extension {
    pub fn assemble(
        host: Arc<dyn ExtensionHost>,
        capabilities: HostCapabilities,
        localizer: Arc<dyn Localizer>,
        images: ImageHandler,
        config: ExtensionConfig,
    ) -> Self {
        let images = Arc::new(images.with_page_host(host.clone()));
        let catalog = Arc::new(MessageCatalog::new(localizer));
        let downloader = Arc::new(Downloader::new(host.clone()));
        let strategy = select_strategy(capabilities, host.clone(), downloader.clone(), &config);

        Self {
            surface: RenderSurface::new(host.clone(), images.clone()),
            background: Background::new(host, catalog, images, strategy, downloader, config),
        }
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    /// 处理一条平台事件，运行到该请求的终态为止。
    pub async fn dispatch(&self, event: HostEvent) {
        match event {
            HostEvent::Hello(_) => log::warn!("⚠️ 重复的握手消息，已忽略"),
            HostEvent::Installed => self.background.on_installed().await,
            HostEvent::MenuClicked { info, tab } => {
                self.background.on_menu_clicked(info, tab).await;
            }
            HostEvent::Message { message } => self.route_message(message).await,
        }
    }

    /// 按 `target` 分发：后台消息交给前端，其余交给渲染面。
    async fn route_message(&self, message: serde_json::Value) {
        let target = message
            .get("target")
            .cloned()
            .and_then(|value| serde_json::from_value::<Target>(value).ok());

        match target {
            Some(Target::Background) => self.background.on_message(&message).await,
            Some(Target::Content | Target::Offscreen) => match parse_envelope(&message) {
                Parsed::Envelope(envelope) => {
                    self.surface.handle(envelope).await;
                }
                Parsed::UnknownOp { op, .. } => log::warn!("unknown op: {}", op),
                Parsed::Malformed { op, reason, .. } => {
                    self.background.report_malformed(&op, reason).await;
                }
                Parsed::Ignored => {}
            },
            None => log::debug!("忽略没有目标的消息"),
        }
    }
}

/// 在给定的输入输出上运行服务，直到输入结束。
pub async fn run<R, W>(reader: R, writer: W) -> Result<(), AppError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    let hello = read_hello(&mut lines).await?;
    log::info!(
        "🚀 握手完成 - 扩展 {}，离屏文档：{}，本地化：{}",
        hello.extension_id,
        hello.capabilities.offscreen,
        hello.messages.is_some()
    );

    let host = Arc::new(JsonLineHost::new(writer, hello.extension_id.clone()));
    let images = ImageHandler::new(hello.image_config.unwrap_or_default())?;
    let extension = Arc::new(Extension::assemble(
        host.clone(),
        hello.capabilities,
        Arc::new(TableLocalizer::new(hello.messages)),
        images,
        hello.config.unwrap_or_default(),
    ));

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_inbound(&line) {
            Ok(Inbound::Reply(reply)) => {
                host.resolve(reply);
            }
            Ok(Inbound::Event(event)) => {
                let extension = Arc::clone(&extension);
                tokio::spawn(async move {
                    extension.dispatch(event).await;
                });
            }
            Err(err) => log::warn!("⚠️ {}", err),
        }
    }

    log::info!("👋 输入结束，服务退出");
    host.disconnect();
    Ok(())
}

/// 第一条非空行必须是 `hello`。
async fn read_hello<R>(lines: &mut Lines<BufReader<R>>) -> Result<Hello, AppError>
where
    R: AsyncRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        return match parse_inbound(&line)? {
            Inbound::Event(HostEvent::Hello(hello)) => Ok(hello),
            other => Err(AppError::Handshake(format!("期望 hello，收到 {:?}", other))),
        };
    }
    Err(AppError::Handshake("输入在握手前结束".to_string()))
}
