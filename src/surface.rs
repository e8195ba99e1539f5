//! # 渲染面
//!
//! ## 设计思路
//!
//! 中继的另一端：运行在离屏文档或注入的内容脚本里（两者共用同一实现），
//! 接收后台发来的 `convertType` / `download`，完成重新编码后通过自己的通道
//! 把 `download` 发回后台。结果不经由来时的端口返回。
//!
//! 失败时发送 `notify`，由后台统一弹出通知。

use std::sync::Arc;

use crate::host::ExtensionHost;
use crate::image_handler::{DataUrl, ERROR_ON_LOADING, ImageError, ImageHandler};
use crate::protocol::{ImageType, MessageEnvelope, Operation, Target};

pub struct RenderSurface {
    host: Arc<dyn ExtensionHost>,
    images: Arc<ImageHandler>,
}

impl RenderSurface {
    pub fn new(host: Arc<dyn ExtensionHost>, images: Arc<ImageHandler>) -> Self {
        Self { host, images }
    }

    /// 处理发往渲染面的信封。不属于渲染面的消息忽略并返回 `false`。
    pub async fn handle(&self, envelope: MessageEnvelope) -> bool {
        if !matches!(envelope.target, Target::Content | Target::Offscreen) {
            return false;
        }

        let reply = match envelope.op {
            Operation::Download { src, filename, .. } => {
                MessageEnvelope::download(Target::Background, src, filename)
            }
            Operation::ConvertType {
                src,
                image_type,
                filename,
            } => match self.convert(&src, image_type).await {
                Ok(converted) => {
                    MessageEnvelope::download(Target::Background, converted.into_string(), filename)
                }
                Err(err) => {
                    log::warn!("⚠️ 渲染面转换失败：{}", err);
                    MessageEnvelope::notify_error(Target::Background, ERROR_ON_LOADING, Some(src))
                }
            },
            Operation::Notify { .. } => {
                log::warn!("unknown op for render surface: notify");
                return false;
            }
        };

        if let Err(err) = self.host.send_message(&reply).await {
            log::warn!("⚠️ 渲染面回传后台失败：{}", err);
        }
        true
    }

    /// 解码与编码是 CPU 密集操作，放到阻塞线程池执行。
    async fn convert(&self, src: &str, image_type: ImageType) -> Result<DataUrl, ImageError> {
        let source = DataUrl::parse(src)?;
        let images = Arc::clone(&self.images);
        tokio::task::spawn_blocking(move || images.reencode(&source, image_type))
            .await
            .map_err(|e| ImageError::Encode(format!("线程执行失败：{}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;
    use crate::image_handler::ImageConfig;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_data_url() -> String {
        let img = ImageBuffer::from_pixel(4, 4, Rgba([200u8, 10, 10, 255]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("encode png");
        DataUrl::from_bytes("image/png", &cursor.into_inner()).into_string()
    }

    fn surface(host: &MemoryHost) -> RenderSurface {
        let images = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        RenderSurface::new(Arc::new(host.clone()), Arc::new(images))
    }

    #[tokio::test]
    async fn convert_type_replies_with_download_of_target_mime() {
        let host = MemoryHost::new("ext");
        let envelope =
            MessageEnvelope::convert_type(Target::Offscreen, png_data_url(), ImageType::Jpg, "a.jpg");

        assert!(surface(&host).handle(envelope).await);

        let sent = host.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, Target::Background);
        match &sent[0].op {
            Operation::Download { src, filename, .. } => {
                assert!(src.starts_with("data:image/jpeg;base64,"));
                assert_eq!(filename, "a.jpg");
            }
            other => panic!("unexpected op: {:?}", other),
        }
    }

    #[tokio::test]
    async fn undecodable_source_replies_with_notify() {
        let host = MemoryHost::new("ext");
        let envelope = MessageEnvelope::convert_type(
            Target::Content,
            "data:image/png;base64,SGVsbG8=",
            ImageType::Webp,
            "a.webp",
        );

        assert!(surface(&host).handle(envelope).await);

        let sent = host.sent_messages();
        assert_eq!(
            sent,
            vec![MessageEnvelope::notify_error(
                Target::Background,
                ERROR_ON_LOADING,
                Some("data:image/png;base64,SGVsbG8=".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn download_is_forwarded_unchanged() {
        let host = MemoryHost::new("ext");
        let envelope = MessageEnvelope::download(Target::Content, "data:image/png;base64,AAAA", "a.png");

        assert!(surface(&host).handle(envelope).await);

        assert_eq!(
            host.sent_messages(),
            vec![MessageEnvelope::download(
                Target::Background,
                "data:image/png;base64,AAAA",
                "a.png"
            )]
        );
    }

    #[tokio::test]
    async fn background_messages_are_not_handled() {
        let host = MemoryHost::new("ext");
        let envelope = MessageEnvelope::download(Target::Background, "data:,x", "a.png");

        assert!(!surface(&host).handle(envelope).await);
        assert!(host.calls().is_empty());
    }
}
