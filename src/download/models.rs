//! 下载引擎的数据模型。
//!
//! 包含媒体条目、下载请求、传输策略、进度采样与单次传输会话等核心数据结构。

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempPath;

use super::error::FailureKind;
use super::path_plan::PlannedPath;

/// 外部元数据方提供的下载对象，不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaItem {
    Movie {
        id: String,
        title: String,
        /// 年份，也接受完整日期（`1999-03-31`），只取前 4 个字符。
        release_year: String,
    },
    Episode {
        show_id: String,
        show_name: String,
        season: u32,
        episode: u32,
        title: String,
    },
    Game {
        id: String,
        title: String,
        direct_link: String,
    },
}

impl MediaItem {
    pub fn is_special(&self) -> bool {
        matches!(self, MediaItem::Episode { season: 0, .. })
    }
}

impl fmt::Display for MediaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaItem::Movie { title, .. } => write!(f, "{title}"),
            MediaItem::Episode {
                show_name,
                season,
                episode,
                ..
            } => write!(f, "{show_name} S{season:02}E{episode:02}"),
            MediaItem::Game { id, title, .. } => write!(f, "{title} [game {id}]"),
        }
    }
}

/// 剧集列表中的一项（由外部元数据方提供，CLI 从 JSON 读取）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeEntry {
    pub season: u32,
    pub episode: u32,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowRef {
    pub id: String,
    pub name: String,
}

impl ShowRef {
    pub fn episode(&self, entry: &EpisodeEntry) -> MediaItem {
        MediaItem::Episode {
            show_id: self.id.clone(),
            show_name: self.name.clone(),
            season: entry.season,
            episode: entry.episode,
            title: entry.title.clone(),
        }
    }
}

/// 调用方期望的最终容器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalContainer {
    #[default]
    Keep,
    Mp4,
}

impl FinalContainer {
    pub fn target(self) -> Option<Container> {
        match self {
            FinalContainer::Keep => None,
            FinalContainer::Mp4 => Some(Container::Mp4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mkv,
    Mp4,
    Rar,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Container::Mkv => "mkv",
            Container::Mp4 => "mp4",
            Container::Rar => "rar",
        }
    }

    /// ffmpeg `-f` 取值；输出写到 `.part` 文件，无法靠扩展名推断。
    pub fn muxer(self) -> Option<&'static str> {
        match self {
            Container::Mkv => Some("matroska"),
            Container::Mp4 => Some("mp4"),
            Container::Rar => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStrategy {
    Progressive,
    SegmentedStream,
}

impl TransportStrategy {
    pub fn default_container(self) -> Container {
        match self {
            TransportStrategy::Progressive => Container::Mkv,
            TransportStrategy::SegmentedStream => Container::Mp4,
        }
    }
}

impl fmt::Display for TransportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportStrategy::Progressive => f.write_str("progressive"),
            TransportStrategy::SegmentedStream => f.write_str("segmented-stream"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Media,
    /// 游戏压缩包：固定走直链下载，保留 `.rar`。
    GameArchive,
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub source_url: String,
    pub destination: PlannedPath,
    pub auth_token: Option<String>,
    pub final_container: FinalContainer,
    pub skip_specials: bool,
    pub kind: RequestKind,
}

/// 引擎运行参数（由配置转换而来）。
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub probe_timeout: Duration,
    pub connect_timeout: Duration,
    pub deadline: Option<Duration>,
    pub ffmpeg: PathBuf,
    pub segmented_ceiling: Duration,
    pub render_interval: Duration,
    pub strip_metadata_fields: Vec<String>,
}

pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn default_strip_metadata_fields() -> Vec<String> {
    [
        "title",
        "description",
        "comment",
        "synopsis",
        "show",
        "episode_id",
        "network",
        "genre",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            probe_timeout: MAX_PROBE_TIMEOUT,
            connect_timeout: Duration::from_secs(15),
            deadline: None,
            ffmpeg: PathBuf::from("ffmpeg"),
            segmented_ceiling: Duration::from_secs_f64(3.5 * 3600.0),
            render_interval: Duration::from_millis(100),
            strip_metadata_fields: default_strip_metadata_fields(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadState {
    Planned,
    Probing,
    Fetching,
    Remuxing,
    PostProcessing,
    Complete(PathBuf),
    Failed(FailureKind),
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Complete(_) | DownloadState::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub strategy: TransportStrategy,
    pub post_processed: bool,
}

/// 单次进度采样：字节数或媒体时间（秒）与其上限。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub done: f64,
    pub ceiling: Option<f64>,
    pub at: Instant,
}

impl ProgressSample {
    pub fn fraction(&self) -> f64 {
        match self.ceiling {
            Some(c) if c > 0.0 => (self.done / c).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

/// 允许渲染时的一次节拍。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTick {
    pub sample: ProgressSample,
    /// `(done - done_at_last_render) / elapsed_since_last_render`
    pub rate: f64,
}

/// 单次传输独占的可变状态，调用结束即丢弃。
///
/// 临时产物由会话持有：会话被丢弃而未提交时，`.part` 文件随之删除。
#[derive(Debug)]
pub struct TransferSession {
    pub strategy: TransportStrategy,
    started: Instant,
    interval: Duration,
    last_render_at: Instant,
    last_rendered_done: f64,
    last_sample: Option<ProgressSample>,
    artifact: Option<TempPath>,
}

impl TransferSession {
    pub fn new(strategy: TransportStrategy, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            strategy,
            started: now,
            interval,
            last_render_at: now,
            last_rendered_done: 0.0,
            last_sample: None,
            artifact: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn last_sample(&self) -> Option<ProgressSample> {
        self.last_sample
    }

    /// 记录采样；距上次渲染不足间隔时返回 `None`。
    pub fn observe(&mut self, sample: ProgressSample) -> Option<RenderTick> {
        self.last_sample = Some(sample);
        let elapsed = sample.at.saturating_duration_since(self.last_render_at);
        if elapsed < self.interval {
            return None;
        }
        Some(self.mark_rendered(sample, elapsed))
    }

    /// 无视节流强制渲染（用于结束时的整条进度）。
    pub fn force(&mut self, sample: ProgressSample) -> RenderTick {
        self.last_sample = Some(sample);
        let elapsed = sample.at.saturating_duration_since(self.last_render_at);
        self.mark_rendered(sample, elapsed)
    }

    fn mark_rendered(&mut self, sample: ProgressSample, elapsed: Duration) -> RenderTick {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            (sample.done - self.last_rendered_done).max(0.0) / secs
        } else {
            0.0
        };
        self.last_render_at = sample.at;
        self.last_rendered_done = sample.done;
        RenderTick { sample, rate }
    }

    /// 每次传输至多一个临时产物。
    pub fn attach_artifact(&mut self, artifact: TempPath) {
        debug_assert!(self.artifact.is_none(), "one temp artifact per transfer");
        self.artifact = Some(artifact);
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    pub fn take_artifact(&mut self) -> Option<TempPath> {
        self.artifact.take()
    }
}
