//! 日志：控制台 + `logs/latest.log`，超过 10MB 或退出时打包为 zip。

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{panic, thread};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST: &str = "latest.log";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
/// 等待后台写线程把缓冲刷进文件。
const FLUSH_GRACE: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    #[error("cannot install subscriber: {0}")]
    Install(tracing_subscriber::util::TryInitError),
    #[error("log file error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot write log archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("cannot format archive timestamp: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    pub console: bool,
}

impl LogOptions {
    /// 命令行默认：彩色控制台，退出时归档。
    pub fn cli(debug: bool) -> Self {
        Self {
            debug,
            use_color: true,
            archive_on_exit: true,
            console: true,
        }
    }
}

/// 持有文件写线程；丢弃时刷盘并（可选）归档。
pub struct LogSystem {
    state: Arc<ExitState>,
}

struct ExitState {
    logs_dir: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    archive: bool,
    done: AtomicBool,
}

impl LogSystem {
    /// `base_dir` 为数据目录，日志写入其下的 `logs/`。
    pub fn init(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let logs_dir = base_dir.unwrap_or(Path::new(".")).join("logs");
        fs::create_dir_all(&logs_dir)?;
        if needs_rotation(&logs_dir.join(LATEST)) {
            archive_latest(&logs_dir)?;
        }

        let (file_writer, guard) =
            NonBlockingBuilder::default().lossy(false).finish(rolling::never(&logs_dir, LATEST));

        let console_writer = if options.console {
            BoxMakeWriter::new(io::stdout)
        } else {
            BoxMakeWriter::new(io::sink)
        };
        let console_level = if options.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let console = fmt::layer()
            .with_target(false)
            .with_ansi(options.use_color)
            .with_writer(console_writer)
            .with_filter(console_level);
        // 文件层始终记录 DEBUG
        let file = fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(file_writer)
            .with_filter(LevelFilter::DEBUG);

        tracing_subscriber::registry()
            .with(console)
            .with(file)
            .try_init()
            .map_err(|e| {
                if e.to_string().contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::Install(e)
                }
            })?;

        let state = Arc::new(ExitState {
            logs_dir,
            guard: Mutex::new(Some(guard)),
            archive: options.archive_on_exit,
            done: AtomicBool::new(false),
        });
        hook_panics(Arc::clone(&state));
        Ok(Self { state })
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.state.shutdown();
    }
}

impl ExitState {
    /// 只执行一次：停止写线程，再归档 `latest.log`。
    fn shutdown(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.guard.lock() {
            drop(guard.take());
        }
        thread::sleep(FLUSH_GRACE);
        if self.archive
            && let Err(err) = archive_latest(&self.logs_dir)
        {
            eprintln!("failed to archive log: {err}");
        }
    }
}

fn hook_panics(state: Arc<ExitState>) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        match info.location() {
            Some(at) => error!("panic at {}:{}: {info}", at.file(), at.line()),
            None => error!("panic: {info}"),
        }
        state.shutdown();
        previous(info);
    }));
}

fn needs_rotation(latest: &Path) -> bool {
    fs::metadata(latest).is_ok_and(|m| m.len() >= ROTATE_AT_BYTES)
}

/// 把 `logs/latest.log` 压缩为 `logs/log_<时间>.zip` 并删除原文件。
///
/// 文件不存在时返回 `None`；空文件直接删除。
fn archive_latest(logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let latest = logs_dir.join(LATEST);
    let size = match fs::metadata(&latest) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if size == 0 {
        fs::remove_file(&latest)?;
        return Ok(None);
    }

    let stamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let target = logs_dir.join(format!("log_{stamp}.zip"));

    // 压缩包写完整后才改名为 log_*.zip
    let staging = tempfile::Builder::new()
        .prefix(".log_")
        .suffix(".zip.part")
        .tempfile_in(logs_dir)?;
    let mut zip = zip::ZipWriter::new(staging.reopen()?);
    zip.start_file(
        format!("{stamp}.log"),
        FileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    io::copy(&mut BufReader::new(File::open(&latest)?), &mut zip)?;
    zip.finish()?;
    staging
        .into_temp_path()
        .persist(&target)
        .map_err(|e| LogError::Io(e.error))?;
    fs::remove_file(&latest)?;

    info!(archive = %target.display(), bytes = size, "log archived");
    Ok(Some(target))
}
