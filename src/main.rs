//! # Save Image As Type — 后台服务入口
//!
//! 本文件仅负责日志初始化与启动事件循环。
//! 进程通过标准输入输出与浏览器侧的 JS 胶水层通信，详见 `lib.rs` 架构文档。

use save_image_as_type::service;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("setup: begin");

    if let Err(err) = service::run(tokio::io::stdin(), tokio::io::stdout()).await {
        log::error!("服务异常退出: {err}");
        std::process::exit(1);
    }
}
