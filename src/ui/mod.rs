//! 交互层入口（命令行）。

pub mod noui;
