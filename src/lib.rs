//! # Save Image As Type — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              浏览器 (JS 胶水层，manifest / 页面)           │
//! │                                                          │
//! │  contextMenus ── downloads ── tabs ── offscreen ── i18n  │
//! │       │  (平台事件 → stdin，调用 ← stdout)               │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ JSON 行协议 (call / reply / event / emit)
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后台服务 (Rust)                       │
//! │                                                          │
//! │  ┌─ service ──── 握手 + 读循环 + 组件装配                │
//! │  │                                                       │
//! │  ├─ front ────── 菜单注册 / 点击 / 入站消息              │
//! │  │   ├─ filename       来源地址 → 文件名                  │
//! │  │   ├─ catalog        本地化消息目录 (惰性缓存)          │
//! │  │   └─ notice         失败 → 一条通知                    │
//! │  │                                                       │
//! │  ├─ image_handler      抓取 → data URL / 解码·重新编码    │
//! │  ├─ delivery           离屏文档 / 内容脚本 两种中继       │
//! │  ├─ surface            渲染面：convertType → download     │
//! │  └─ host               ExtensionHost trait + 实现         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 服务级错误类型 `AppError` |
//! | [`protocol`] | 跨上下文消息信封、目标格式、菜单事件 |
//! | [`filename`] | 从图片地址推导下载文件名 |
//! | [`catalog`] | 本地化消息的惰性加载与兜底 |
//! | [`config`] | 扩展级配置：资源路径、商店地址、离屏参数 |
//! | [`image_handler`] | 任意来源转 data URL，解码与按格式重新编码 |
//! | [`delivery`] | 按宿主能力选定的交付策略 |
//! | [`download`] | 以“另存为”方式发起下载 |
//! | [`notice`] | 失败通知的拼装与发送 |
//! | [`surface`] | 渲染面：重新编码后把下载请求发回后台 |
//! | [`front`] | 菜单与事件前端 |
//! | [`host`] | 宿主平台能力抽象、JSON 行实现、内存实现 |
//! | [`service`] | 握手、组件装配与事件循环 |

pub mod error;
pub mod catalog;
pub mod config;
pub mod delivery;
pub mod download;
pub mod filename;
pub mod front;
pub mod host;
pub mod image_handler;
pub mod notice;
pub mod protocol;
pub mod service;
pub mod surface;
