//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 单个请求的失败由 `ImageError` 表达，并最终变成一条用户通知；
//! `AppError` 只用在进程级：握手失败、标准输入输出断开、协议错乱。
//! 这些错误会让服务退出，由入口记录日志。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError`、`HostError` 与 I/O 错误提供 `From` 转换，无需手动 map。

use crate::host::HostError;
use crate::image_handler::ImageError;

/// 服务级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片处理流水线错误（抓取 / 解码 / 编码）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 宿主调用或协议错误
    #[error("{0}")]
    Host(#[from] HostError),

    /// 标准输入输出错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 宿主没有按约定先发送握手
    #[error("握手失败: {0}")]
    Handshake(String),
}
