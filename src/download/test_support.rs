//! 测试辅助：本地 HTTP 服务与脚本化子进程。

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use reqwest::blocking::Client;

use super::process::{LineRead, ProcessRunner, RunningProcess};
use super::progress::ProgressSink;

/// 在后台线程里起一个 axum 服务，返回 `http://127.0.0.1:<port>`。
pub(crate) fn serve(router: Router) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let _ = axum::serve(listener, router).await;
        });
    });

    format!("http://{addr}")
}

pub(crate) fn test_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .timeout(None)
        .build()
        .unwrap()
}

#[derive(Debug, Default, Clone)]
pub(crate) struct CollectSink {
    pub(crate) lines: Arc<Mutex<Vec<String>>>,
    pub(crate) finished: Arc<Mutex<bool>>,
}

impl CollectSink {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl ProgressSink for CollectSink {
    fn width(&self) -> usize {
        120
    }

    fn draw(&mut self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn finish(&mut self) {
        *self.finished.lock().unwrap() = true;
    }
}

/// 一次脚本化运行：输出文件内容、`-progress` 行、退出码。
#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub(crate) lines: Vec<String>,
    pub(crate) exit_code: Option<i32>,
    pub(crate) write_output: Option<Vec<u8>>,
    pub(crate) stderr: String,
    /// 输出完毕后不结束，直到被 kill。
    pub(crate) hang: bool,
}

impl Script {
    pub(crate) fn ok(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            exit_code: Some(0),
            write_output: Some(b"remuxed".to_vec()),
            stderr: String::new(),
            hang: false,
        }
    }

    pub(crate) fn fail(code: i32, lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            exit_code: Some(code),
            write_output: Some(b"partial".to_vec()),
            stderr: "conversion failed".to_string(),
            hang: false,
        }
    }
}

/// 依次回放脚本的 `ProcessRunner`；输出路径取最后一个参数。
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedRunner {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    pub(crate) calls: Arc<Mutex<Vec<Vec<String>>>>,
    pub(crate) killed: Arc<Mutex<bool>>,
}

impl ScriptedRunner {
    pub(crate) fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn spawn(&self, program: &Path, args: &[OsString]) -> io::Result<Box<dyn RunningProcess>> {
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let mut call = vec![program.to_string_lossy().into_owned()];
        call.extend(args.iter().cloned());
        self.calls.lock().unwrap().push(call);

        let Some(script) = self.scripts.lock().unwrap().pop_front() else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no script left"));
        };
        if let (Some(bytes), Some(out)) = (&script.write_output, args.last()) {
            let out = PathBuf::from(out);
            if out.parent().is_some_and(Path::exists) {
                fs::write(&out, bytes)?;
            }
        }

        Ok(Box::new(ScriptedProcess {
            lines: script.lines.into(),
            exit_code: script.exit_code,
            stderr: script.stderr,
            hang: script.hang,
            killed: self.killed.clone(),
        }))
    }
}

struct ScriptedProcess {
    lines: VecDeque<String>,
    exit_code: Option<i32>,
    stderr: String,
    hang: bool,
    killed: Arc<Mutex<bool>>,
}

impl RunningProcess for ScriptedProcess {
    fn next_line(&mut self, timeout: Duration) -> LineRead {
        if let Some(line) = self.lines.pop_front() {
            return LineRead::Line(line);
        }
        if self.hang && !*self.killed.lock().unwrap() {
            std::thread::sleep(timeout.min(Duration::from_millis(20)));
            return LineRead::Idle;
        }
        LineRead::Closed
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        if *self.killed.lock().unwrap() {
            return Ok(None);
        }
        Ok(self.exit_code)
    }

    fn kill(&mut self) -> io::Result<()> {
        *self.killed.lock().unwrap() = true;
        Ok(())
    }

    fn stderr_tail(&mut self) -> String {
        self.stderr.clone()
    }
}
