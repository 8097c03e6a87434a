use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// 引擎对调用方暴露的错误。
///
/// 除 `InvalidName` / `Filesystem`（尚无产物）外，返回前都已清理本次传输的临时文件。
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network error fetching {url}: {cause}")]
    Network { url: String, cause: String },

    #[error("{program} failed ({}){}", exit_label(.exit_code), tail_label(.stderr_tail))]
    Process {
        program: String,
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("filesystem error at {}: {source}", .path.display())]
    Filesystem { path: PathBuf, source: io::Error },

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("download cancelled")]
    Cancelled,

    #[error("deadline exceeded while {phase}")]
    DeadlineExceeded { phase: &'static str },
}

impl EngineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::Network { .. } => FailureKind::Network,
            EngineError::Process { exit_code, .. } => FailureKind::Process(*exit_code),
            EngineError::Filesystem { .. } => FailureKind::Filesystem,
            EngineError::InvalidName(_) => FailureKind::InvalidName,
            EngineError::Cancelled => FailureKind::Cancelled,
            EngineError::DeadlineExceeded { .. } => FailureKind::DeadlineExceeded,
        }
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Process(Option<i32>),
    Filesystem,
    InvalidName,
    Cancelled,
    DeadlineExceeded,
}

/// 探测失败：只记录日志并回落为直链下载，从不返回给调用方。
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("probe timed out")]
    Timeout,
    #[error("probe request failed: {0}")]
    Transport(String),
    #[error("probe returned HTTP {0}")]
    Status(u16),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code".to_string(),
    }
}

fn tail_label(tail: &str) -> String {
    let tail = tail.trim();
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {tail}")
    }
}
