//! 下载引擎入口。
//!
//! 子模块：
//! - `models`：数据模型（MediaItem / DownloadRequest / TransferSession 等）
//! - `error`：引擎错误类型
//! - `path_plan`：媒体库目录布局与文件名清洗
//! - `transport`：HEAD 探测，选择直链或分段流
//! - `progress`：进度条渲染与终端输出
//! - `process`：外部进程（ffmpeg）抽象
//! - `fetcher`：直链下载
//! - `remux`：分段流重封装与 ffmpeg 进度解析
//! - `postprocess`：容器转换
//! - `downloader`：下载状态机与季/整剧顺序下载

pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod path_plan;
pub mod postprocess;
pub mod process;
pub mod progress;
pub mod remux;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
