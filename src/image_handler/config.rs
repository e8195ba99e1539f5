//! # 图片处理配置
//!
//! ## 设计思路
//!
//! 将抓取、解码、编码三个阶段的阈值集中到 `ImageConfig`，生产默认值偏保守，
//! 测试可以按需调小上限来覆盖资源限制分支。

use serde::{Deserialize, Serialize};

/// 图片处理配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// 抓取原始字节时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 单次抓取总超时（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时（秒）。
    pub connect_timeout: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// JPEG 输出质量（1~100）。
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            max_redirects: 5,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            jpeg_quality: 92,
        }
    }
}
