//! 取消信号：Ctrl+C 置位，下载循环在每个挂起点检查。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// 第一次 Ctrl+C 只置位取消标志，让当前传输清理临时文件后退出；第二次直接结束进程。
pub fn install_ctrlc(token: &CancelToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    let presses = AtomicU32::new(0);
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            warn!(target: "startup", "interrupt received, cancelling current download (press Ctrl+C again to force quit)");
            token.cancel();
        } else {
            std::process::exit(130);
        }
    })
}
