//! # 抓取与编码桥
//!
//! ## 设计思路
//!
//! 把“任意来源 → data URL”收敛为一个入口 `fetch_as_data_url`：
//! 内联地址原样返回，其余地址交给 `Fetch` 抓取后转为 base64 data URL。
//! 网络层抽象为 trait，生产实现基于 `reqwest`，测试可替换为计数桩。
//!
//! `http(s)` 之外的协议（`blob:`、`filesystem:` 等）只在页面里有意义，
//! 交给 `PageFetcher` 经宿主在页面环境中读取。
//!
//! ## 实现思路
//!
//! - 流式读取响应体，边读边做体积上限检查。
//! - 0 字节一律视为失败，不看 HTTP 状态码。
//! - 非 2xx 只记录告警，响应体照常交给后续解码去判定。
//! - MIME 取自 `Content-Type`，缺失时用 `infer` 嗅探文件头。

use std::time::Duration;

use std::sync::Arc;

use async_trait::async_trait;

use super::source::{DataUrl, FetchedImage, OCTET_STREAM, is_inline};
use super::{ImageConfig, ImageError, ImageHandler};
use crate::host::ExtensionHost;

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 网络抓取能力。
#[async_trait]
pub trait Fetch: Send + Sync {
    /// 抓取 `url` 的完整响应体。
    async fn fetch(&self, url: &str) -> Result<FetchedBody, ImageError>;
}

/// 抓取到的响应体与响应头里声明的类型。
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: bytes::Bytes,
    pub content_type: Option<String>,
}

/// 基于 `reqwest` 的抓取实现。
pub struct HttpFetcher {
    client: reqwest::Client,
    max_file_size: u64,
}

impl HttpFetcher {
    pub fn new(config: &ImageConfig) -> Result<Self, ImageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| ImageError::Fetch(format!("HTTP 客户端初始化失败：{}", e)))?;

        Ok(Self {
            client,
            max_file_size: config.max_file_size,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBody, ImageError> {
        log::debug!("📡 发送 HTTP 请求...");
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::Fetch(format!("网络请求失败：{}", e)))?;

        let status = response.status();
        if !status.is_success() {
            log::warn!(
                "⚠️ HTTP {} - URL: {}（响应体仍交给解码阶段判定）",
                status.as_u16(),
                redact_url_for_log(url)
            );
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);

        let declared_len = response.content_length();
        if let Some(size) = declared_len {
            if size > self.max_file_size {
                return Err(ImageError::ResourceLimit(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    self.max_file_size as f64 / 1024.0 / 1024.0
                )));
            }
        }

        let initial_capacity = declared_len
            .map(|len| len.min(self.max_file_size) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ImageError::Fetch(format!("下载失败：{}", e)))?
        {
            if (buffer.len() + chunk.len()) as u64 > self.max_file_size {
                return Err(ImageError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(FetchedBody {
            bytes: bytes::Bytes::from(buffer),
            content_type,
        })
    }
}

/// 经宿主在页面环境中读取的抓取实现，宿主以 data URL 应答。
pub struct PageFetcher {
    host: Arc<dyn ExtensionHost>,
    max_file_size: u64,
}

impl PageFetcher {
    pub fn new(host: Arc<dyn ExtensionHost>, config: &ImageConfig) -> Self {
        Self {
            host,
            max_file_size: config.max_file_size,
        }
    }
}

#[async_trait]
impl Fetch for PageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBody, ImageError> {
        log::debug!("📄 通过页面读取：{}", redact_url_for_log(url));
        let answer = self
            .host
            .fetch_as_data_url(url)
            .await
            .map_err(|e| ImageError::Fetch(e.to_string()))?;

        let data_url = DataUrl::parse(&answer)?;
        let bytes = data_url.decode_bytes()?;
        if bytes.len() as u64 > self.max_file_size {
            return Err(ImageError::ResourceLimit("页面内容超过大小限制".to_string()));
        }

        Ok(FetchedBody {
            bytes: bytes::Bytes::from(bytes),
            content_type: Some(data_url.mime().to_string()),
        })
    }
}

/// 是否为后台可以直接发起网络请求的地址。
fn is_network(url: &str) -> bool {
    let scheme = url.split(':').next().unwrap_or("");
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

impl ImageHandler {
    /// 把任意来源转换为 data URL。
    ///
    /// 内联地址不会触发网络请求；多个请求可以并发进行，彼此结果互不影响。
    pub async fn fetch_as_data_url(&self, source: &str) -> Result<DataUrl, ImageError> {
        if is_inline(source) {
            return DataUrl::parse(source);
        }

        log::info!("🌐 开始抓取图片 - URL: {}", redact_url_for_log(source));
        let fetched = self.load_from_url(source).await?;
        let mime = fetched.mime.as_deref().unwrap_or(OCTET_STREAM);
        Ok(DataUrl::from_bytes(mime, &fetched.bytes))
    }

    async fn load_from_url(&self, url: &str) -> Result<FetchedImage, ImageError> {
        let body = if is_network(url) {
            self.fetcher.fetch(url).await?
        } else {
            let page = self.page_fetcher.as_ref().ok_or_else(|| {
                ImageError::Fetch(format!("不支持的来源协议：{}", redact_url_for_log(url)))
            })?;
            page.fetch(url).await?
        };
        if body.bytes.is_empty() {
            return Err(ImageError::Fetch("抓取到的内容大小为 0".to_string()));
        }

        let mime = body
            .content_type
            .as_deref()
            .and_then(essence_of_content_type)
            .or_else(|| infer::get(&body.bytes).map(|kind| kind.mime_type().to_string()));

        log::debug!(
            "📦 抓取完成 - {} 字节，类型: {}",
            body.bytes.len(),
            mime.as_deref().unwrap_or(OCTET_STREAM)
        );

        Ok(FetchedImage {
            bytes: body.bytes,
            mime,
        })
    }
}

/// 去掉 `Content-Type` 的参数部分，只保留小写的 `type/subtype`。
fn essence_of_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    if essence.is_empty() || !essence.contains('/') {
        return None;
    }
    Some(essence)
}

/// 日志中隐藏查询串与片段，data URL 只保留前缀。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    if is_inline(url) {
        return match DataUrl::parse(url) {
            Ok(data_url) => data_url.summary(),
            Err(_) => "data:<invalid>".to_string(),
        };
    }
    match reqwest::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// 计数型抓取桩：按 URL 返回固定内容。
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetch for CountingFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedBody, ImageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // 让出调度，放大并发交错
            tokio::task::yield_now().await;
            match url {
                "https://example.com/empty.png" => Ok(FetchedBody {
                    bytes: bytes::Bytes::new(),
                    content_type: Some("image/png".to_string()),
                }),
                "https://example.com/offline.png" => {
                    Err(ImageError::Fetch("dns error: no such host".to_string()))
                }
                other => Ok(FetchedBody {
                    bytes: bytes::Bytes::from(other.as_bytes().to_vec()),
                    content_type: Some("image/gif; charset=binary".to_string()),
                }),
            }
        }
    }

    fn handler_with_counter() -> (ImageHandler, Arc<CountingFetcher>) {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let handler = ImageHandler::with_fetcher(ImageConfig::default(), fetcher.clone());
        (handler, fetcher)
    }

    #[tokio::test]
    async fn inline_source_is_returned_without_network() {
        let (handler, fetcher) = handler_with_counter();
        let source = "data:image/png;base64,AAAA";

        let result = handler.fetch_as_data_url(source).await.expect("inline passthrough");

        assert_eq!(result.as_str(), source);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_byte_body_is_fetch_error() {
        let (handler, fetcher) = handler_with_counter();

        let result = handler.fetch_as_data_url("https://example.com/empty.png").await;

        assert!(matches!(result, Err(ImageError::Fetch(_))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn network_error_message_is_propagated() {
        let (handler, _) = handler_with_counter();

        let result = handler.fetch_as_data_url("https://example.com/offline.png").await;

        match result {
            Err(ImageError::Fetch(msg)) => assert!(msg.contains("no such host")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn content_type_parameters_are_stripped() {
        let (handler, _) = handler_with_counter();

        let result = handler
            .fetch_as_data_url("https://example.com/a.gif")
            .await
            .expect("fetch");

        assert_eq!(result.mime(), "image/gif");
        assert_eq!(
            result.decode_bytes().expect("decode"),
            b"https://example.com/a.gif"
        );
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_independently() {
        let (handler, fetcher) = handler_with_counter();
        let handler = Arc::new(handler);

        let urls: Vec<String> = (0..8).map(|i| format!("https://example.com/{}.gif", i)).collect();
        let tasks: Vec<_> = urls
            .iter()
            .cloned()
            .map(|url| {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { (url.clone(), handler.fetch_as_data_url(&url).await) })
            })
            .collect();

        for task in tasks {
            let (url, result) = task.await.expect("join");
            let data_url = result.expect("fetch");
            assert_eq!(data_url.decode_bytes().expect("decode"), url.as_bytes());
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), urls.len());
    }

    #[tokio::test]
    async fn page_only_sources_are_read_through_the_host() {
        use crate::host::memory::{HostCall, MemoryHost};

        let host = MemoryHost::new("ext")
            .with_page_data("blob:https://a.example/5b1c", "data:image/webp;base64,UklGRg==");
        let (handler, fetcher) = handler_with_counter();
        let handler = handler.with_page_fetcher(Arc::new(PageFetcher::new(
            Arc::new(host.clone()),
            &ImageConfig::default(),
        )));

        let result = handler
            .fetch_as_data_url("blob:https://a.example/5b1c")
            .await
            .expect("page fetch");

        assert_eq!(result.as_str(), "data:image/webp;base64,UklGRg==");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            host.calls(),
            vec![HostCall::FetchAsDataUrl("blob:https://a.example/5b1c".to_string())]
        );

        let missing = handler.fetch_as_data_url("blob:https://a.example/gone").await;
        assert!(matches!(missing, Err(ImageError::Fetch(_))));
    }

    #[tokio::test]
    async fn page_only_source_without_page_access_is_fetch_error() {
        let (handler, fetcher) = handler_with_counter();

        let result = handler.fetch_as_data_url("blob:https://a.example/5b1c").await;

        assert!(matches!(result, Err(ImageError::Fetch(_))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn only_http_schemes_go_to_the_network() {
        assert!(is_network("https://a.example/x.png"));
        assert!(is_network("HTTP://a.example/x.png"));
        assert!(!is_network("blob:https://a.example/5b1c"));
        assert!(!is_network("filesystem:https://a.example/temporary/x.png"));
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        let redacted = redact_url_for_log("https://example.com:8443/path/img.png?token=abc123#hash");

        assert_eq!(redacted, "https://example.com:8443/path/img.png");
    }

    #[test]
    fn essence_ignores_parameters_and_case() {
        assert_eq!(
            essence_of_content_type("IMAGE/PNG; charset=utf-8").as_deref(),
            Some("image/png")
        );
        assert_eq!(essence_of_content_type("garbage"), None);
    }

    fn serve_once(status_line: &'static str, headers: &'static str, body: &'static [u8]) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");

            let mut req_buf = [0u8; 1024];
            let _ = stream.read(&mut req_buf);

            let response = format!(
                "{}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                headers,
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .expect("write headers failed");
            // 客户端可能因体积限制提前断开，body 写失败不算测试失败
            let _ = stream.write_all(body);
            let _ = stream.flush();
        });

        (format!("http://127.0.0.1:{}/img", addr.port()), server)
    }

    #[tokio::test]
    async fn http_fetcher_rejects_empty_success_response() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", "Content-Type: image/png\r\n", b"");
        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");

        let result = handler.fetch_as_data_url(&url).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ImageError::Fetch(_))));
    }

    #[tokio::test]
    async fn http_fetcher_sniffs_mime_when_header_missing() {
        const PNG_SIGNATURE: &[u8] = &[137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];
        let (url, server) = serve_once("HTTP/1.1 200 OK", "", PNG_SIGNATURE);
        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");

        let result = handler.fetch_as_data_url(&url).await;
        server.join().expect("server thread failed");

        let data_url = result.expect("fetch");
        assert_eq!(data_url.mime(), "image/png");
        assert_eq!(data_url.decode_bytes().expect("decode"), PNG_SIGNATURE);
    }

    #[tokio::test]
    async fn http_fetcher_enforces_size_limit() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", "Content-Type: image/png\r\n", b"0123456789");
        let mut config = ImageConfig::default();
        config.max_file_size = 4;
        let handler = ImageHandler::new(config).expect("handler init failed");

        let result = handler.fetch_as_data_url(&url).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }
}
