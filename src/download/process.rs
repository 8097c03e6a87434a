//! 外部进程抽象（ffmpeg）。
//!
//! `ProcessRunner` 负责拉起进程；`RunningProcess` 以有限、不可重放的方式逐行产出 stdout，
//! 并提供等待 / 终止 / stderr 尾部。测试用脚本化实现替换，回放预置的进度行。

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use super::error::EngineError;

const STDOUT_QUEUE: usize = 256;
const STDERR_TAIL_LINES: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    /// 在给定时间内没有新行，进程仍可能在运行。
    Idle,
    /// 输出流已结束，之后不会再有行。
    Closed,
}

pub trait ProcessRunner {
    fn spawn(&self, program: &Path, args: &[OsString]) -> io::Result<Box<dyn RunningProcess>>;
}

pub trait RunningProcess {
    fn next_line(&mut self, timeout: Duration) -> LineRead;
    /// 阻塞直到进程退出；被信号终止时返回 `None`。
    fn wait(&mut self) -> io::Result<Option<i32>>;
    fn kill(&mut self) -> io::Result<()>;
    fn stderr_tail(&mut self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn spawn(&self, program: &Path, args: &[OsString]) -> io::Result<Box<dyn RunningProcess>> {
        debug!(target: "process", program = %program.display(), ?args, "spawn");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr not captured"))?;

        let (tx, rx) = crossbeam_channel::bounded(STDOUT_QUEUE);
        let stdout_reader = thread::Builder::new()
            .name("proc-stdout".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_reader = {
            let tail = Arc::clone(&tail);
            thread::Builder::new()
                .name("proc-stderr".to_string())
                .spawn(move || collect_tail(stderr, &tail))?
        };

        Ok(Box::new(SystemProcess {
            child,
            lines: rx,
            tail,
            readers: vec![stdout_reader, stderr_reader],
            exited: false,
        }))
    }
}

fn collect_tail(stderr: impl Read, tail: &Mutex<VecDeque<String>>) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                if let Ok(mut t) = tail.lock() {
                    if t.len() == STDERR_TAIL_LINES {
                        t.pop_front();
                    }
                    t.push_back(line);
                }
            }
        }
    }
}

struct SystemProcess {
    child: Child,
    lines: Receiver<String>,
    tail: Arc<Mutex<VecDeque<String>>>,
    readers: Vec<JoinHandle<()>>,
    exited: bool,
}

impl SystemProcess {
    fn join_readers(&mut self) {
        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl RunningProcess for SystemProcess {
    fn next_line(&mut self, timeout: Duration) -> LineRead {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => LineRead::Line(line),
            Err(RecvTimeoutError::Timeout) => LineRead::Idle,
            Err(RecvTimeoutError::Disconnected) => LineRead::Closed,
        }
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait()?;
        self.exited = true;
        self.join_readers();
        Ok(status.code())
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            // 已经退出
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn stderr_tail(&mut self) -> String {
        self.tail
            .lock()
            .map(|t| t.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }
}

impl Drop for SystemProcess {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        if let Err(e) = self.child.kill() {
            if e.kind() != io::ErrorKind::InvalidInput {
                warn!(target: "process", error = %e, "failed to kill child on drop");
            }
        }
        let _ = self.child.wait();
        self.join_readers();
    }
}

/// `-version` 检查最长等待时间。
const VERSION_CHECK_LIMIT: Duration = Duration::from_secs(5);

/// 运行 `<program> -version` 检查外部工具是否可用。
pub fn ensure_available(runner: &dyn ProcessRunner, program: &Path) -> Result<(), EngineError> {
    ensure_available_within(runner, program, VERSION_CHECK_LIMIT)
}

fn ensure_available_within(
    runner: &dyn ProcessRunner,
    program: &Path,
    limit: Duration,
) -> Result<(), EngineError> {
    let name = program.display().to_string();
    let mut proc = runner
        .spawn(program, &[OsString::from("-version")])
        .map_err(|e| EngineError::Process {
            program: name.clone(),
            exit_code: None,
            stderr_tail: format!("cannot start {name}: {e}"),
        })?;

    let started = Instant::now();
    while let LineRead::Line(_) | LineRead::Idle = proc.next_line(Duration::from_millis(200)) {
        if started.elapsed() >= limit {
            let _ = proc.kill();
            let _ = proc.wait();
            return Err(EngineError::Process {
                program: name,
                exit_code: None,
                stderr_tail: format!("no exit within {}s after -version", limit.as_secs()),
            });
        }
    }

    let code = proc.wait().map_err(|e| EngineError::Process {
        program: name.clone(),
        exit_code: None,
        stderr_tail: e.to_string(),
    })?;
    if code == Some(0) {
        Ok(())
    } else {
        Err(EngineError::Process {
            program: name,
            exit_code: code,
            stderr_tail: proc.stderr_tail(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Box<dyn RunningProcess> {
        SystemRunner
            .spawn(
                Path::new("sh"),
                &[OsString::from("-c"), OsString::from(script)],
            )
            .unwrap()
    }

    fn drain(proc: &mut Box<dyn RunningProcess>) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match proc.next_line(Duration::from_secs(5)) {
                LineRead::Line(l) => out.push(l),
                LineRead::Idle => continue,
                LineRead::Closed => return out,
            }
        }
    }

    #[test]
    fn lines_are_finite_and_exit_code_is_reported() {
        let mut proc = sh("printf 'out_time_us=1000000\\nprogress=end\\n'; echo boom >&2; exit 3");
        assert_eq!(drain(&mut proc), vec!["out_time_us=1000000", "progress=end"]);
        assert_eq!(proc.next_line(Duration::from_millis(10)), LineRead::Closed);
        assert_eq!(proc.wait().unwrap(), Some(3));
        assert_eq!(proc.stderr_tail(), "boom");
    }

    #[test]
    fn stderr_tail_keeps_only_last_lines() {
        let mut proc = sh("i=0; while [ $i -lt 30 ]; do echo line$i >&2; i=$((i+1)); done");
        drain(&mut proc);
        proc.wait().unwrap();
        let tail = proc.stderr_tail();
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines.last(), Some(&"line29"));
    }

    #[test]
    fn silent_process_reports_idle_and_can_be_killed() {
        let mut proc = sh("exec sleep 30");
        assert_eq!(proc.next_line(Duration::from_millis(50)), LineRead::Idle);
        proc.kill().unwrap();
        assert_eq!(proc.wait().unwrap(), None);
    }

    #[test]
    fn missing_program_is_a_process_error() {
        let err = ensure_available(&SystemRunner, Path::new("/nonexistent/ffmpeg-xyz")).unwrap_err();
        assert!(matches!(err, EngineError::Process { exit_code: None, .. }));
    }

    #[test]
    fn available_program_passes_check() {
        ensure_available(&SystemRunner, Path::new("true")).unwrap();
    }

    #[test]
    fn program_that_never_exits_fails_the_check() {
        use crate::download::test_support::{Script, ScriptedRunner};

        let mut script = Script::ok(&[]);
        script.hang = true;
        let runner = ScriptedRunner::new(vec![script]);
        let started = Instant::now();

        let err = ensure_available_within(&runner, Path::new("not-ffmpeg"), Duration::from_millis(300))
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(*runner.killed.lock().unwrap());
        match err {
            EngineError::Process { exit_code: None, stderr_tail, .. } => {
                assert!(stderr_tail.contains("no exit"), "{stderr_tail}")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
