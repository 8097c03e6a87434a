//! 下载主流程编排。
//!
//! 单次下载的状态机：
//! `Planned → Probing → {Fetching | Remuxing} → [PostProcessing] → Complete`，
//! 任一非终态都可能转为 `Failed(kind)`；报告 `Failed` 之前本次传输的临时文件已被清理。
//!
//! 同一时刻只处理一个传输，季/整剧按顺序逐集下载，彼此之间不共享可变状态。

use std::path::PathBuf;
use std::time::Instant;

use reqwest::blocking::Client;
use tracing::{debug, error, info, warn};

use super::error::EngineError;
use super::fetcher::fetch_progressive;
use super::models::{
    Container, DownloadOutcome, DownloadRequest, DownloadState, EngineSettings, EpisodeEntry,
    FinalContainer, MediaItem, RequestKind, ShowRef, TransferSession, TransportStrategy,
};
use super::path_plan::plan;
use super::postprocess::convert;
use super::process::{ProcessRunner, SystemRunner, ensure_available};
use super::progress::{ProgressSink, TerminalSink};
use super::remux::remux_segmented;
use super::transport::probe;
use crate::base_system::cancel::CancelToken;

/// 内容源与媒体库相关的参数（由配置转换而来）。
#[derive(Debug, Clone)]
pub struct LibraryProfile {
    pub library_root: PathBuf,
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub final_container: FinalContainer,
    pub skip_specials: bool,
}

type StateObserver = Box<dyn FnMut(&DownloadState) + Send>;

/// 批量（季/整剧）下载的结果汇总。
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<DownloadOutcome>,
    pub failed: Vec<(MediaItem, EngineError)>,
    pub skipped: usize,
    /// 因取消而提前结束。
    pub cancelled: bool,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

pub struct Engine {
    client: Client,
    runner: Box<dyn ProcessRunner>,
    sink: Box<dyn ProgressSink>,
    observer: Option<StateObserver>,
    settings: EngineSettings,
    profile: LibraryProfile,
}

impl Engine {
    pub fn new(settings: EngineSettings, profile: LibraryProfile) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(None)
            .build()
            .map_err(|e| EngineError::Network {
                url: profile.api_base_url.clone(),
                cause: format!("init http client: {e}"),
            })?;
        Ok(Self {
            client,
            runner: Box::new(SystemRunner),
            sink: Box::new(TerminalSink::new()),
            observer: None,
            settings,
            profile,
        })
    }

    pub fn with_runner(mut self, runner: Box<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// 每次状态转换时回调（同步执行）。
    pub fn on_state(mut self, observer: impl FnMut(&DownloadState) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn profile(&self) -> &LibraryProfile {
        &self.profile
    }

    /// 需要转换容器时，提前确认 ffmpeg 可以运行。
    pub fn ensure_ffmpeg(&self) -> Result<(), EngineError> {
        ensure_available(&*self.runner, &self.settings.ffmpeg)
    }

    /// 内容源地址：`<base>?tmdbId=<id>`，季、集都大于 0 时追加 `&season=&episode=`。
    pub fn source_url(&self, item: &MediaItem) -> String {
        let base = self.profile.api_base_url.as_str();
        let sep = if base.contains('?') { '&' } else { '?' };
        match item {
            MediaItem::Movie { id, .. } => format!("{base}{sep}tmdbId={id}"),
            MediaItem::Episode {
                show_id,
                season,
                episode,
                ..
            } if *season > 0 && *episode > 0 => {
                format!("{base}{sep}tmdbId={show_id}&season={season}&episode={episode}")
            }
            MediaItem::Episode { show_id, .. } => format!("{base}{sep}tmdbId={show_id}"),
            MediaItem::Game { direct_link, .. } => direct_link.clone(),
        }
    }

    pub fn request_for(&self, item: &MediaItem) -> Result<DownloadRequest, EngineError> {
        let destination = plan(item, &self.profile.library_root)?;
        let kind = match item {
            MediaItem::Game { .. } => RequestKind::GameArchive,
            _ => RequestKind::Media,
        };
        Ok(DownloadRequest {
            source_url: self.source_url(item),
            destination,
            auth_token: self.profile.api_key.clone().filter(|k| !k.is_empty()),
            final_container: self.profile.final_container,
            skip_specials: self.profile.skip_specials,
            kind,
        })
    }

    pub fn download_item(
        &mut self,
        item: &MediaItem,
        cancel: &CancelToken,
    ) -> Result<DownloadOutcome, EngineError> {
        info!(target: "download", %item, "download requested");
        let request = match self.request_for(item) {
            Ok(r) => r,
            Err(e) => {
                notify(&mut self.observer, DownloadState::Failed(e.kind()));
                return Err(e);
            }
        };
        self.download(&request, cancel)
    }

    /// 执行一次完整下载，返回最终文件路径。
    pub fn download(
        &mut self,
        request: &DownloadRequest,
        cancel: &CancelToken,
    ) -> Result<DownloadOutcome, EngineError> {
        let deadline = self.settings.deadline.map(|d| Instant::now() + d);
        notify(&mut self.observer, DownloadState::Planned);

        let result = self.run(request, cancel, deadline);
        match &result {
            Ok(outcome) => {
                info!(
                    target: "download",
                    path = %outcome.path.display(),
                    strategy = %outcome.strategy,
                    post_processed = outcome.post_processed,
                    "download complete"
                );
                notify(&mut self.observer, DownloadState::Complete(outcome.path.clone()));
            }
            Err(e) => {
                error!(target: "download", url = %request.source_url, error = %e, "download failed");
                notify(&mut self.observer, DownloadState::Failed(e.kind()));
            }
        }
        result
    }

    fn run(
        &mut self,
        request: &DownloadRequest,
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<DownloadOutcome, EngineError> {
        let Engine {
            client,
            runner,
            sink,
            observer,
            settings,
            ..
        } = self;
        let token = request.auth_token.as_deref();

        check(cancel, deadline, "planning")?;
        request.destination.ensure_dir()?;

        let strategy = match request.kind {
            RequestKind::GameArchive => TransportStrategy::Progressive,
            RequestKind::Media => {
                notify(observer, DownloadState::Probing);
                check(cancel, deadline, "probing")?;
                let timeout = match deadline {
                    Some(d) => settings
                        .probe_timeout
                        .min(d.saturating_duration_since(Instant::now())),
                    None => settings.probe_timeout,
                };
                let outcome = probe(client, &request.source_url, token, timeout);
                debug!(
                    target: "download",
                    strategy = %outcome.strategy,
                    content_type = ?outcome.content_type,
                    probe_failure = ?outcome.failure,
                    "transport selected"
                );
                outcome.strategy
            }
        };

        let container = match request.kind {
            RequestKind::GameArchive => Container::Rar,
            RequestKind::Media => strategy.default_container(),
        };
        let raw = request.destination.file(container);
        let mut session = TransferSession::new(strategy, settings.render_interval);

        match strategy {
            TransportStrategy::Progressive => {
                notify(observer, DownloadState::Fetching);
                fetch_progressive(
                    client,
                    &request.source_url,
                    token,
                    &raw,
                    &mut session,
                    &mut **sink,
                    cancel,
                    deadline,
                )?;
            }
            TransportStrategy::SegmentedStream => {
                notify(observer, DownloadState::Remuxing);
                remux_segmented(
                    &**runner,
                    &settings.ffmpeg,
                    &request.source_url,
                    token,
                    &raw,
                    container,
                    &settings.strip_metadata_fields,
                    settings.segmented_ceiling,
                    &mut session,
                    &mut **sink,
                    cancel,
                    deadline,
                )?;
            }
        }

        let target = match request.kind {
            RequestKind::GameArchive => None,
            RequestKind::Media => request
                .final_container
                .target()
                .filter(|t| *t != container),
        };
        let Some(target) = target else {
            return Ok(DownloadOutcome {
                path: raw,
                strategy,
                post_processed: false,
            });
        };

        notify(observer, DownloadState::PostProcessing);
        let path = convert(
            &**runner,
            &settings.ffmpeg,
            &raw,
            target,
            &settings.strip_metadata_fields,
            &mut session,
            &mut **sink,
            cancel,
            deadline,
        )?;
        Ok(DownloadOutcome {
            path,
            strategy,
            post_processed: true,
        })
    }

    /// 按顺序下载某一季；开启 `skip_specials` 时第 0 季整体跳过。
    pub fn download_season(
        &mut self,
        show: &ShowRef,
        episodes: &[EpisodeEntry],
        season: u32,
        cancel: &CancelToken,
    ) -> BatchReport {
        let selected: Vec<&EpisodeEntry> = episodes.iter().filter(|e| e.season == season).collect();
        info!(target: "download", show = %show.name, season, episodes = selected.len(), "season download");
        self.run_batch(show, selected, cancel)
    }

    /// 按季、集顺序下载整部剧。
    pub fn download_show(
        &mut self,
        show: &ShowRef,
        episodes: &[EpisodeEntry],
        cancel: &CancelToken,
    ) -> BatchReport {
        info!(target: "download", show = %show.name, episodes = episodes.len(), "show download");
        self.run_batch(show, episodes.iter().collect(), cancel)
    }

    fn run_batch(
        &mut self,
        show: &ShowRef,
        mut episodes: Vec<&EpisodeEntry>,
        cancel: &CancelToken,
    ) -> BatchReport {
        episodes.sort_by_key(|e| (e.season, e.episode));
        let mut report = BatchReport::default();

        for entry in episodes {
            let item = show.episode(entry);
            let request = match self.request_for(&item) {
                Ok(r) => r,
                Err(e) => {
                    notify(&mut self.observer, DownloadState::Failed(e.kind()));
                    report.failed.push((item, e));
                    continue;
                }
            };
            if request.skip_specials && item.is_special() {
                debug!(target: "download", %item, "skipping special");
                report.skipped += 1;
                continue;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            info!(target: "download", %item, "download requested");
            match self.download(&request, cancel) {
                Ok(outcome) => report.succeeded.push(outcome),
                Err(EngineError::Cancelled) => {
                    warn!(target: "download", %item, "batch cancelled");
                    report.failed.push((item, EngineError::Cancelled));
                    report.cancelled = true;
                    break;
                }
                Err(e) => report.failed.push((item, e)),
            }
        }

        info!(
            target: "download",
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            "batch finished"
        );
        report
    }
}

fn notify(observer: &mut Option<StateObserver>, state: DownloadState) {
    debug!(target: "download", ?state, terminal = state.is_terminal(), "state");
    if let Some(observer) = observer.as_mut() {
        observer(&state);
    }
}

fn check(
    cancel: &CancelToken,
    deadline: Option<Instant>,
    phase: &'static str,
) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    if deadline.is_some_and(|d| Instant::now() >= d) {
        return Err(EngineError::DeadlineExceeded { phase });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::Router;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::get;

    use super::*;
    use crate::download::error::FailureKind;
    use crate::download::test_support::{CollectSink, Script, ScriptedRunner, serve};

    const MOVIE_BYTES: usize = 200_000;

    fn files_under(dir: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return out;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(files_under(&path));
            } else {
                out.push(path);
            }
        }
        out.sort();
        out
    }

    async fn direct(Query(q): Query<HashMap<String, String>>, headers: HeaderMap) -> impl IntoResponse {
        if headers.get("x-api-key").is_some_and(|v| v != "k") {
            return (StatusCode::UNAUTHORIZED, [(header::CONTENT_TYPE, "text/plain")], Vec::new());
        }
        let id = q.get("tmdbId").map(String::as_str).unwrap_or("");
        let episode = q.get("episode").map(String::as_str);
        match (id, episode) {
            ("27205", None) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                vec![1u8; MOVIE_BYTES],
            ),
            ("1399", Some("3")) => (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain")],
                Vec::new(),
            ),
            ("1399", Some(_)) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
                b"#EXTM3U\n".to_vec(),
            ),
            ("1399", None) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "video/x-matroska")],
                b"special".to_vec(),
            ),
            _ => (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain")],
                Vec::new(),
            ),
        }
    }

    fn server() -> String {
        let app = Router::new()
            .route("/direct", get(direct))
            .route("/games/file.rar", get(|| async { b"RAR!archive".to_vec() }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    "late"
                }),
            );
        serve(app)
    }

    struct Harness {
        engine: Engine,
        runner: ScriptedRunner,
        states: Arc<Mutex<Vec<DownloadState>>>,
        root: tempfile::TempDir,
    }

    fn harness(base: &str, container: FinalContainer, scripts: Vec<Script>) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(scripts);
        let states = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&states);
        let settings = EngineSettings {
            render_interval: Duration::ZERO,
            ..EngineSettings::default()
        };
        let profile = LibraryProfile {
            library_root: root.path().to_path_buf(),
            api_base_url: format!("{base}/direct"),
            api_key: Some("k".to_string()),
            final_container: container,
            skip_specials: true,
        };
        let engine = Engine::new(settings, profile)
            .unwrap()
            .with_runner(Box::new(runner.clone()))
            .with_sink(Box::new(CollectSink::default()))
            .on_state(move |s| recorded.lock().unwrap().push(s.clone()));
        Harness {
            engine,
            runner,
            states,
            root,
        }
    }

    fn movie() -> MediaItem {
        MediaItem::Movie {
            id: "27205".into(),
            title: "Inception: Dreams".into(),
            release_year: "2010-07-16".into(),
        }
    }

    fn show() -> ShowRef {
        ShowRef {
            id: "1399".into(),
            name: "Game of Thrones".into(),
        }
    }

    fn entry(season: u32, episode: u32, title: &str) -> EpisodeEntry {
        EpisodeEntry {
            season,
            episode,
            title: title.into(),
        }
    }

    #[test]
    fn source_urls() {
        let h = harness("http://api", FinalContainer::Keep, vec![]);
        assert_eq!(h.engine.source_url(&movie()), "http://api/direct?tmdbId=27205");
        assert_eq!(
            h.engine.source_url(&show().episode(&entry(2, 5, "x"))),
            "http://api/direct?tmdbId=1399&season=2&episode=5"
        );
        assert_eq!(
            h.engine.source_url(&show().episode(&entry(0, 1, "x"))),
            "http://api/direct?tmdbId=1399"
        );
    }

    #[test]
    fn progressive_movie_keeps_raw_container() {
        let base = server();
        let mut h = harness(&base, FinalContainer::Keep, vec![]);

        let outcome = h.engine.download_item(&movie(), &CancelToken::new()).unwrap();

        let expected = h.root.path().join("Movies").join("Inception Dreams (2010).mkv");
        assert_eq!(outcome.path, expected);
        assert_eq!(outcome.strategy, TransportStrategy::Progressive);
        assert!(!outcome.post_processed);
        assert_eq!(std::fs::read(&expected).unwrap().len(), MOVIE_BYTES);
        assert_eq!(files_under(h.root.path()), vec![expected.clone()]);
        assert_eq!(
            *h.states.lock().unwrap(),
            vec![
                DownloadState::Planned,
                DownloadState::Probing,
                DownloadState::Fetching,
                DownloadState::Complete(expected),
            ]
        );
        assert!(h.runner.calls().is_empty());
    }

    #[test]
    fn progressive_movie_converted_to_mp4() {
        let base = server();
        let mut h = harness(&base, FinalContainer::Mp4, vec![Script::ok(&["progress=end"])]);

        let outcome = h.engine.download_item(&movie(), &CancelToken::new()).unwrap();

        let expected = h.root.path().join("Movies").join("Inception Dreams (2010).mp4");
        assert_eq!(outcome.path, expected);
        assert!(outcome.post_processed);
        assert_eq!(files_under(h.root.path()), vec![expected]);
        assert!(h.states.lock().unwrap().contains(&DownloadState::PostProcessing));
    }

    #[test]
    fn failed_conversion_keeps_raw_and_reports_process_error() {
        let base = server();
        // 带字幕与去字幕各失败一次
        let scripts = vec![Script::fail(1, &[]), Script::fail(1, &[])];
        let mut h = harness(&base, FinalContainer::Mp4, scripts);

        let err = h.engine.download_item(&movie(), &CancelToken::new()).unwrap_err();

        assert!(matches!(err, EngineError::Process { exit_code: Some(1), .. }));
        let raw = h.root.path().join("Movies").join("Inception Dreams (2010).mkv");
        assert_eq!(files_under(h.root.path()), vec![raw]);
        assert_eq!(
            h.states.lock().unwrap().last(),
            Some(&DownloadState::Failed(FailureKind::Process(Some(1))))
        );
    }

    #[test]
    fn segmented_episode_is_remuxed_to_mp4() {
        let base = server();
        let mut h = harness(&base, FinalContainer::Mp4, vec![Script::ok(&["progress=end"])]);
        let item = show().episode(&entry(1, 2, "The Kingsroad"));

        let outcome = h.engine.download_item(&item, &CancelToken::new()).unwrap();

        let expected = h
            .root
            .path()
            .join("TV Shows/Game of Thrones/Season 01/Game of Thrones - S01E02 - The Kingsroad.mp4");
        assert_eq!(outcome.path, expected);
        assert_eq!(outcome.strategy, TransportStrategy::SegmentedStream);
        assert!(!outcome.post_processed);
        assert_eq!(files_under(h.root.path()), vec![expected]);

        let calls = h.runner.calls();
        assert_eq!(calls.len(), 1);
        let joined = calls[0].join(" ");
        assert!(joined.contains(&format!("-i {base}/direct?tmdbId=1399&season=1&episode=2")));
        assert!(joined.contains("X-API-Key: k"));
        assert!(h.states.lock().unwrap().contains(&DownloadState::Remuxing));
    }

    #[test]
    fn failed_remux_leaves_no_artifacts() {
        let base = server();
        let mut h = harness(&base, FinalContainer::Keep, vec![Script::fail(8, &["out_time_us=10"])]);
        let item = show().episode(&entry(1, 1, "Winter Is Coming"));

        let err = h.engine.download_item(&item, &CancelToken::new()).unwrap_err();

        assert!(matches!(err, EngineError::Process { exit_code: Some(8), .. }));
        assert!(files_under(h.root.path()).is_empty());
    }

    #[test]
    fn missing_source_is_network_error_after_fail_open_probe() {
        let base = server();
        let mut h = harness(&base, FinalContainer::Keep, vec![]);
        let item = show().episode(&entry(1, 3, "Lord Snow"));

        let err = h.engine.download_item(&item, &CancelToken::new()).unwrap_err();

        assert!(matches!(err, EngineError::Network { .. }));
        assert!(files_under(h.root.path()).is_empty());
        assert!(h.states.lock().unwrap().contains(&DownloadState::Fetching));
    }

    #[test]
    fn game_archive_skips_probe_and_conversion() {
        let base = server();
        let mut h = harness(&base, FinalContainer::Mp4, vec![]);
        let game = MediaItem::Game {
            id: "g1".into(),
            title: "Half-Life".into(),
            direct_link: format!("{base}/games/file.rar"),
        };

        let outcome = h.engine.download_item(&game, &CancelToken::new()).unwrap();

        let expected = h.root.path().join("Games").join("Half-Life.rar");
        assert_eq!(outcome.path, expected);
        assert_eq!(std::fs::read(&expected).unwrap(), b"RAR!archive");
        assert!(!h.states.lock().unwrap().contains(&DownloadState::Probing));
        assert!(h.runner.calls().is_empty());
    }

    #[test]
    fn invalid_name_fails_before_any_io() {
        let mut h = harness("http://127.0.0.1:9", FinalContainer::Keep, vec![]);
        let item = MediaItem::Movie {
            id: "1".into(),
            title: "???".into(),
            release_year: "2000".into(),
        };
        let err = h.engine.download_item(&item, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidName(_)));
        assert!(files_under(h.root.path()).is_empty());
        assert_eq!(
            *h.states.lock().unwrap(),
            vec![DownloadState::Failed(FailureKind::InvalidName)]
        );
    }

    #[test]
    fn deadline_applies_to_transfer() {
        let base = server();
        let mut h = harness(&base, FinalContainer::Keep, vec![]);
        h.engine.settings.deadline = Some(Duration::from_millis(400));
        let game = MediaItem::Game {
            id: "g2".into(),
            title: "Slow".into(),
            direct_link: format!("{base}/slow"),
        };

        let err = h.engine.download_item(&game, &CancelToken::new()).unwrap_err();

        assert!(matches!(err, EngineError::DeadlineExceeded { .. }));
        assert!(files_under(h.root.path()).is_empty());
    }

    #[test]
    fn season_batch_skips_specials_and_continues_past_failures() {
        let base = server();
        let mut h = harness(
            &base,
            FinalContainer::Keep,
            vec![Script::ok(&["progress=end"]), Script::ok(&["progress=end"])],
        );
        let episodes = vec![
            entry(1, 3, "Lord Snow"),
            entry(0, 1, "Inside the Episode"),
            entry(1, 1, "Winter Is Coming"),
            entry(1, 2, "The Kingsroad"),
            entry(2, 1, "The North Remembers"),
        ];

        let report = h.engine.download_season(&show(), &episodes, 1, &CancelToken::new());

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.cancelled);
        assert!(report.succeeded[0].path.ends_with("Game of Thrones - S01E01 - Winter Is Coming.mp4"));
        assert!(matches!(report.failed[0].1, EngineError::Network { .. }));

        let specials = h.engine.download_season(&show(), &episodes, 0, &CancelToken::new());
        assert_eq!(specials.skipped, 1);
        assert!(specials.succeeded.is_empty() && specials.failed.is_empty());
    }

    #[test]
    fn cancelled_batch_stops_early() {
        let base = server();
        let mut h = harness(&base, FinalContainer::Keep, vec![]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let episodes = vec![entry(1, 1, "A"), entry(1, 2, "B")];

        let report = h.engine.download_show(&show(), &episodes, &cancel);

        assert!(report.cancelled);
        assert!(report.succeeded.is_empty());
        assert!(!report.is_clean());
        assert!(h.runner.calls().is_empty());
        assert!(files_under(h.root.path()).is_empty());
    }

    #[test]
    fn ffmpeg_check_uses_runner() {
        let h = harness("http://api", FinalContainer::Mp4, vec![Script::ok(&["ffmpeg version 7.0"])]);
        h.engine.ensure_ffmpeg().unwrap();
        assert_eq!(h.runner.calls()[0], vec!["ffmpeg", "-version"]);

        let missing = harness("http://api", FinalContainer::Mp4, vec![]);
        assert!(matches!(
            missing.engine.ensure_ffmpeg(),
            Err(EngineError::Process { exit_code: None, .. })
        ));
    }
}
