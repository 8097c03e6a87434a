//! 分段流（HLS）重封装：交给 ffmpeg 拉取所有分段，音视频/字幕只复制不转码，
//! 并丢弃容器级元数据。
//!
//! 进度来自 `-progress pipe:1` 的 `key=value` 行。分段源事先拿不到总时长，
//! 所以进度按配置的上限时长（默认 3.5 小时）估算并截断到 [0,1]。

use std::ffi::OsString;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::error::EngineError;
use super::models::{Container, ProgressSample, TransferSession};
use super::process::{LineRead, ProcessRunner, RunningProcess};
use super::progress::{ProgressSink, Readout, render};
use super::transport::API_KEY_HEADER;
use crate::base_system::cancel::CancelToken;

/// 空闲轮询间隔：没有新输出时也按此频率检查取消与截止时间。
const POLL: Duration = Duration::from_millis(200);

/// 一个 `-progress` 块（以 `progress=` 行结束）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub out_time: Option<Duration>,
    pub total_size: Option<u64>,
    pub speed: Option<f64>,
    pub end: bool,
}

#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    /// 喂入一行；遇到 `progress=continue|end` 时返回完整的一块。
    pub fn feed(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key.trim() {
            // ffmpeg 的 out_time_ms 实际也是微秒
            "out_time_us" | "out_time_ms" => {
                if let Some(t) = parse_micros(value) {
                    self.current.out_time = Some(t);
                }
            }
            "out_time" => {
                if let Some(t) = parse_clock(value) {
                    self.current.out_time = Some(t);
                }
            }
            "total_size" => {
                if let Ok(size) = value.parse::<u64>() {
                    self.current.total_size = Some(size);
                }
            }
            "speed" => {
                self.current.speed = value
                    .trim_end_matches('x')
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite());
            }
            "progress" => {
                let mut block = self.current.clone();
                block.end = value == "end";
                return Some(block);
            }
            _ => {}
        }
        None
    }
}

fn parse_micros(value: &str) -> Option<Duration> {
    let us: i64 = value.parse().ok()?;
    (us >= 0).then(|| Duration::from_micros(us as u64))
}

/// `HH:MM:SS.micro`
pub fn parse_clock(value: &str) -> Option<Duration> {
    let parts: Vec<&str> = value.split(':').collect();
    let [h, m, s] = parts.as_slice() else {
        return None;
    };
    let hours: f64 = h.parse().ok()?;
    let minutes: f64 = m.parse().ok()?;
    let seconds: f64 = s.parse().ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    (total.is_finite() && total >= 0.0).then(|| Duration::from_secs_f64(total))
}

/// 公共的输入参数：静默、覆盖输出、不读 stdin。
fn preamble() -> Vec<OsString> {
    ["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]
        .iter()
        .map(OsString::from)
        .collect()
}

/// 输出保留哪些轨道。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracks {
    /// 交给 ffmpeg 默认选择：每种类型一条最佳轨道。HLS 主列表的每个码率都会
    /// 暴露为独立的流，显式全选会把所有码率都拉下来。
    Auto,
    /// 本地文件：保留全部音视频，字幕可选。
    All { subtitles: bool },
}

/// 轨道映射 + 只复制 + 清空元数据 + 机器可读进度 + 强制封装格式。
fn output_args(
    container: Container,
    tracks: Tracks,
    strip_fields: &[String],
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let subtitles = match tracks {
        Tracks::Auto => true,
        Tracks::All { subtitles } => {
            let maps: &[&str] = if subtitles {
                &["0:v?", "0:a?", "0:s?"]
            } else {
                &["0:v?", "0:a?"]
            };
            for map in maps {
                args.push("-map".into());
                args.push((*map).into());
            }
            subtitles
        }
    };
    args.push("-c".into());
    args.push("copy".into());
    if !subtitles {
        args.push("-sn".into());
    } else if container == Container::Mp4 {
        // mp4 只能装 mov_text 字幕
        args.push("-c:s".into());
        args.push("mov_text".into());
    }
    args.push("-map_metadata".into());
    args.push("-1".into());
    for field in strip_fields {
        args.push("-metadata".into());
        args.push(format!("{field}=").into());
    }
    args.push("-progress".into());
    args.push("pipe:1".into());
    args.push("-nostats".into());
    if let Some(muxer) = container.muxer() {
        args.push("-f".into());
        args.push(muxer.into());
    }
    args.push(output.as_os_str().to_os_string());
    args
}

pub fn segmented_args(
    source_url: &str,
    auth_token: Option<&str>,
    container: Container,
    strip_fields: &[String],
    output: &Path,
) -> Vec<OsString> {
    let mut args = preamble();
    if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
        args.push("-headers".into());
        args.push(format!("{API_KEY_HEADER}: {token}\r\n").into());
    }
    args.push("-i".into());
    args.push(source_url.into());
    args.extend(output_args(container, Tracks::Auto, strip_fields, output));
    args
}

pub fn convert_args(
    input: &Path,
    container: Container,
    tracks: Tracks,
    strip_fields: &[String],
    output: &Path,
) -> Vec<OsString> {
    let mut args = preamble();
    args.push("-i".into());
    args.push(input.as_os_str().to_os_string());
    args.extend(output_args(container, tracks, strip_fields, output));
    args
}

/// 进度的分母。
#[derive(Debug, Clone, Copy)]
pub(crate) enum Measure {
    /// 按输出时间估算（分段流没有总时长）。
    Time(Duration),
    /// 按已写字节数对比输入大小（只复制时输出与输入大小接近）。
    Bytes(u64),
}

/// 一次 ffmpeg 调用的上下文。
pub(crate) struct FfmpegJob<'a> {
    pub program: &'a Path,
    pub args: Vec<OsString>,
    pub measure: Measure,
    pub phase: &'static str,
}

/// 运行 ffmpeg 并把进度渲染到 `sink`；非零退出、取消、超时均返回错误。
///
/// 临时产物由 `session` 持有，出错时随会话一起清理。
pub(crate) fn drive(
    runner: &dyn ProcessRunner,
    job: FfmpegJob<'_>,
    session: &mut TransferSession,
    sink: &mut dyn ProgressSink,
    cancel: &CancelToken,
    deadline: Option<Instant>,
) -> Result<(), EngineError> {
    let program = job.program.display().to_string();
    let mut proc = runner
        .spawn(job.program, &job.args)
        .map_err(|e| EngineError::Process {
            program: program.clone(),
            exit_code: None,
            stderr_tail: format!("cannot start {program}: {e}"),
        })?;

    debug!(
        target: "remux",
        phase = job.phase,
        strategy = %session.strategy,
        part = ?session.artifact_path(),
        "ffmpeg started"
    );
    let ceiling = match job.measure {
        Measure::Time(limit) => limit.as_secs_f64(),
        Measure::Bytes(size) => size.max(1) as f64,
    };
    let mut parser = ProgressParser::default();

    loop {
        if cancel.is_cancelled() {
            abort(proc.as_mut(), sink);
            return Err(EngineError::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            abort(proc.as_mut(), sink);
            return Err(EngineError::DeadlineExceeded { phase: job.phase });
        }

        match proc.next_line(POLL) {
            LineRead::Line(line) => {
                let Some(block) = parser.feed(&line) else {
                    continue;
                };
                let previous = session.last_sample().map(|s| s.done).unwrap_or_default();
                let position = block.out_time.unwrap_or_default();
                let done = match job.measure {
                    Measure::Time(_) => block.out_time.map_or(previous, |t| t.as_secs_f64()),
                    Measure::Bytes(_) => block.total_size.map_or(previous, |n| n as f64),
                };
                let sample = ProgressSample {
                    done,
                    ceiling: Some(ceiling),
                    at: Instant::now(),
                };
                let readout = Readout::Media {
                    position,
                    speed: block.speed,
                    size: block.total_size,
                };
                if block.end {
                    session.force(sample);
                    sink.draw(&render(1.0, &readout, sink.width()));
                    debug!(target: "remux", phase = job.phase, ?position, "ffmpeg reported end");
                } else if let Some(tick) = session.observe(sample) {
                    sink.draw(&render(tick.sample.fraction(), &readout, sink.width()));
                }
            }
            LineRead::Idle => {}
            LineRead::Closed => break,
        }
    }

    let code = proc.wait().map_err(|e| EngineError::Process {
        program: program.clone(),
        exit_code: None,
        stderr_tail: e.to_string(),
    })?;
    sink.finish();

    if code == Some(0) {
        Ok(())
    } else {
        Err(EngineError::Process {
            program,
            exit_code: code,
            stderr_tail: proc.stderr_tail(),
        })
    }
}

fn abort(proc: &mut dyn RunningProcess, sink: &mut dyn ProgressSink) {
    let _ = proc.kill();
    let _ = proc.wait();
    sink.finish();
}

/// 分段流 → 目标文件。成功时 `.part` 原子改名为 `dest`。
#[allow(clippy::too_many_arguments)]
pub fn remux_segmented(
    runner: &dyn ProcessRunner,
    program: &Path,
    source_url: &str,
    auth_token: Option<&str>,
    dest: &Path,
    container: Container,
    strip_fields: &[String],
    ceiling: Duration,
    session: &mut TransferSession,
    sink: &mut dyn ProgressSink,
    cancel: &CancelToken,
    deadline: Option<Instant>,
) -> Result<(), EngineError> {
    let temp = super::fetcher::create_part(dest)?;
    let args = segmented_args(source_url, auth_token, container, strip_fields, &temp);
    session.attach_artifact(temp);

    info!(target: "remux", url = %source_url, dest = %dest.display(), "remuxing segmented stream");
    drive(
        runner,
        FfmpegJob {
            program,
            args,
            measure: Measure::Time(ceiling),
            phase: "remuxing",
        },
        session,
        sink,
        cancel,
        deadline,
    )?;

    super::fetcher::commit_part(session, dest)
}
