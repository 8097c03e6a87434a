//! 直链下载：单个 GET，正文流式写入目标目录下的 `.part` 临时文件，完成后原子改名。

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Request};
use tempfile::TempPath;
use tracing::{debug, info};

use super::error::EngineError;
use super::models::{ProgressSample, TransferSession};
use super::progress::{ProgressSink, Readout, render};
use super::transport::with_token;
use crate::base_system::cancel::CancelToken;

const CHUNK: usize = 64 * 1024;
const PHASE: &str = "fetching";
/// 等待数据时检查取消/截止时间的间隔。
const POLL: Duration = Duration::from_millis(200);
/// 读取线程最多领先写入的块数。
const PIPE_DEPTH: usize = 8;

/// 在 `dest` 同目录创建 `.<文件名>.XXXX.part`；丢弃即删除。
pub(crate) fn create_part(dest: &Path) -> Result<TempPath, EngineError> {
    let dir = dest
        .parent()
        .ok_or_else(|| EngineError::fs(dest, io::Error::other("destination has no parent directory")))?;
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".part")
        .tempfile_in(dir)
        .map(|f| f.into_temp_path())
        .map_err(|e| EngineError::fs(dir, e))
}

/// 把会话持有的临时文件改名为 `dest`（覆盖已有文件）。
pub(crate) fn commit_part(session: &mut TransferSession, dest: &Path) -> Result<(), EngineError> {
    let temp = session
        .take_artifact()
        .ok_or_else(|| EngineError::fs(dest, io::Error::other("no temporary artifact to commit")))?;
    temp.persist(dest).map_err(|e| EngineError::fs(dest, e.error))?;
    debug!(target: "fetch", dest = %dest.display(), "artifact committed");
    Ok(())
}

fn interrupted(cancel: &CancelToken, deadline: Option<Instant>) -> Option<EngineError> {
    if cancel.is_cancelled() {
        return Some(EngineError::Cancelled);
    }
    if deadline.is_some_and(|d| Instant::now() >= d) {
        return Some(EngineError::DeadlineExceeded { phase: PHASE });
    }
    None
}

/// 后台读取线程发回的消息。
enum Pumped {
    Head { status: StatusCode, total: Option<u64> },
    Chunk(Vec<u8>),
    Eof,
    Failed(String),
}

/// 在后台线程里发请求、读正文；接收端丢弃后线程自行退出。
///
/// 阻塞的 `send()`/`read()` 无法被打断，放到线程里后调用方只需轮询通道。
fn pump(client: Client, request: Request, tx: Sender<Pumped>) {
    let mut resp = match client.execute(request) {
        Ok(resp) => resp,
        Err(e) => {
            let _ = tx.send(Pumped::Failed(e.to_string()));
            return;
        }
    };
    let status = resp.status();
    let total = resp.content_length().filter(|n| *n > 0);
    if tx.send(Pumped::Head { status, total }).is_err() || !status.is_success() {
        return;
    }

    let mut buf = vec![0u8; CHUNK];
    loop {
        let msg = match resp.read(&mut buf) {
            Ok(0) => Pumped::Eof,
            Ok(n) => Pumped::Chunk(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Pumped::Failed(e.to_string()),
        };
        let more = matches!(msg, Pumped::Chunk(_));
        if tx.send(msg).is_err() || !more {
            return;
        }
    }
}

/// 下载 `url` 到 `dest`，返回写入的字节数。
///
/// 取消与截止时间至少每 200ms 检查一次，包括服务器不再发送数据时。
/// 任何失败都不会在目标目录留下文件。
#[allow(clippy::too_many_arguments)]
pub fn fetch_progressive(
    client: &Client,
    url: &str,
    auth_token: Option<&str>,
    dest: &Path,
    session: &mut TransferSession,
    sink: &mut dyn ProgressSink,
    cancel: &CancelToken,
    deadline: Option<Instant>,
) -> Result<u64, EngineError> {
    if let Some(err) = interrupted(cancel, deadline) {
        return Err(err);
    }
    let network = |cause: String| EngineError::Network {
        url: url.to_string(),
        cause,
    };

    let temp = create_part(dest)?;
    let mut file = BufWriter::new(File::create(&temp).map_err(|e| EngineError::fs(&*temp, e))?);
    let part_path = temp.to_path_buf();
    session.attach_artifact(temp);

    let mut req = with_token(client.get(url), auth_token);
    if let Some(d) = deadline {
        req = req.timeout(d.saturating_duration_since(Instant::now()));
    }
    let request = req.build().map_err(|e| network(e.to_string()))?;
    info!(target: "fetch", %url, dest = %dest.display(), "progressive download");

    let (tx, rx) = crossbeam_channel::bounded(PIPE_DEPTH);
    let worker = client.clone();
    thread::Builder::new()
        .name("fetch-body".into())
        .spawn(move || pump(worker, request, tx))
        .map_err(|e| network(format!("cannot start reader thread: {e}")))?;

    let mut total = None;
    let mut done: u64 = 0;
    loop {
        if let Some(err) = interrupted(cancel, deadline) {
            sink.finish();
            debug!(target: "fetch", %url, done, "transfer interrupted");
            return Err(err);
        }
        let bytes = match rx.recv_timeout(POLL) {
            Ok(Pumped::Head { status, total: len }) => {
                if !status.is_success() {
                    return Err(network(format!("HTTP {status}")));
                }
                total = len;
                continue;
            }
            Ok(Pumped::Chunk(bytes)) => bytes,
            Ok(Pumped::Eof) => break,
            Ok(Pumped::Failed(cause)) => {
                sink.finish();
                return Err(interrupted(cancel, deadline).unwrap_or_else(|| network(cause)));
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                sink.finish();
                return Err(network("reader thread stopped unexpectedly".into()));
            }
        };
        file.write_all(&bytes)
            .map_err(|e| EngineError::fs(&part_path, e))?;
        done += bytes.len() as u64;

        let sample = ProgressSample {
            done: done as f64,
            ceiling: total.map(|t| t as f64),
            at: Instant::now(),
        };
        if let Some(tick) = session.observe(sample) {
            let readout = Readout::Bytes {
                done,
                total,
                per_sec: tick.rate,
            };
            sink.draw(&render(tick.sample.fraction(), &readout, sink.width()));
        }
    }
    file.flush().map_err(|e| EngineError::fs(&part_path, e))?;
    drop(file);

    let tick = session.force(ProgressSample {
        done: done as f64,
        ceiling: Some(total.unwrap_or(done) as f64),
        at: Instant::now(),
    });
    let secs = session.elapsed().as_secs_f64();
    let readout = Readout::Bytes {
        done,
        total: Some(total.unwrap_or(done)),
        per_sec: if secs > 0.0 { done as f64 / secs } else { tick.rate },
    };
    sink.draw(&render(1.0, &readout, sink.width()));
    sink.finish();

    commit_part(session, dest)?;
    Ok(done)
}
