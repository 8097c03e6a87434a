//! 无交互 CLI：把命令行参数转换为 `MediaItem`，驱动下载引擎并打印结果。

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::FormattedDuration;
use tracing::info;

use crate::base_system::cancel::CancelToken;
use crate::base_system::context::Config;
use crate::download::downloader::{BatchReport, Engine};
use crate::download::error::EngineError;
use crate::download::models::{EpisodeEntry, MediaItem, ShowRef};

/// 一次命令行任务。
#[derive(Debug, Clone)]
pub enum Job {
    Single(MediaItem),
    Season {
        show: ShowRef,
        season: u32,
        episodes: PathBuf,
    },
    Show {
        show: ShowRef,
        episodes: PathBuf,
    },
}

/// 执行任务；返回 `false` 表示有条目失败或被取消。
pub fn run(config: &Config, base_dir: Option<&Path>, job: Job, cancel: &CancelToken) -> Result<bool> {
    let mut engine = build_engine(config, base_dir)?;
    println!("媒体库: {}", engine.profile().library_root.display());
    let start = Instant::now();

    let ok = match job {
        Job::Single(item) => {
            println!("开始下载: {item}");
            match engine.download_item(&item, cancel) {
                Ok(outcome) => {
                    println!("下载完成: {}", outcome.path.display());
                    true
                }
                Err(err) => {
                    print_failure(&engine, &item, &err);
                    false
                }
            }
        }
        Job::Season {
            show,
            season,
            episodes,
        } => {
            let list = load_episodes(&episodes)?;
            println!("开始下载: {} 第 {season} 季", show.name);
            let report = engine.download_season(&show, &list, season, cancel);
            print_report(&engine, &report);
            report.is_clean()
        }
        Job::Show { show, episodes } => {
            let list = load_episodes(&episodes)?;
            println!("开始下载: {}（{} 集）", show.name, list.len());
            let report = engine.download_show(&show, &list, cancel);
            print_report(&engine, &report);
            report.is_clean()
        }
    };

    info!(target: "download", ok, "job finished");
    println!("耗时: {}", FormattedDuration(start.elapsed()));
    Ok(ok)
}

fn build_engine(config: &Config, base_dir: Option<&Path>) -> Result<Engine> {
    let mut profile = config.library_profile();
    if let Some(base) = base_dir
        && profile.library_root.is_relative()
    {
        profile.library_root = base.join(&profile.library_root);
    }
    let needs_ffmpeg = profile.final_container.target().is_some();

    let engine = Engine::new(config.engine_settings(), profile).context("初始化下载引擎失败")?;
    if needs_ffmpeg {
        engine
            .ensure_ffmpeg()
            .context("需要 ffmpeg 转换容器，但 ffmpeg 不可用（检查 ffmpeg_path 配置）")?;
    }
    Ok(engine)
}

/// 读取剧集列表 JSON：`[{"season":1,"episode":2,"title":"Pilot"}]`；`-` 表示标准输入。
pub fn load_episodes(path: &Path) -> Result<Vec<EpisodeEntry>> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("读取标准输入失败")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("读取剧集列表失败: {}", path.display()))?
    };
    serde_json::from_str(&raw).with_context(|| format!("剧集列表格式错误: {}", path.display()))
}

fn print_failure(engine: &Engine, item: &MediaItem, err: &EngineError) {
    println!("下载失败: {item}");
    println!("  原因: {err}");
    if let Some(target) = affected_path(engine, item) {
        println!("  路径: {}", target.display());
    }
}

/// 失败条目对应的目标位置（目录 + 文件名主体，不含扩展名）。
fn affected_path(engine: &Engine, item: &MediaItem) -> Option<PathBuf> {
    engine
        .request_for(item)
        .ok()
        .map(|r| r.destination.dir().join(r.destination.stem()))
}

fn print_report(engine: &Engine, report: &BatchReport) {
    for outcome in &report.succeeded {
        println!("下载完成: {}", outcome.path.display());
    }
    for (item, err) in &report.failed {
        print_failure(engine, item, err);
    }
    println!("{}", summary_line(report));
}

fn summary_line(report: &BatchReport) -> String {
    let mut line = format!(
        "成功 {} | 失败 {} | 跳过 {}",
        report.succeeded.len(),
        report.failed.len(),
        report.skipped
    );
    if report.cancelled {
        line.push_str(" | 已取消");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_list_is_parsed_with_optional_titles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodes.json");
        fs::write(
            &path,
            r#"[{"season":1,"episode":2,"title":"Pilot"},{"season":0,"episode":1}]"#,
        )
        .unwrap();

        let list = load_episodes(&path).unwrap();

        assert_eq!(
            list,
            vec![
                EpisodeEntry {
                    season: 1,
                    episode: 2,
                    title: "Pilot".into()
                },
                EpisodeEntry {
                    season: 0,
                    episode: 1,
                    title: String::new()
                },
            ]
        );
    }

    #[test]
    fn malformed_episode_list_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let err = load_episodes(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad.json"));
    }

    #[test]
    fn summary_mentions_cancellation() {
        let report = BatchReport {
            skipped: 2,
            cancelled: true,
            ..BatchReport::default()
        };
        assert_eq!(summary_line(&report), "成功 0 | 失败 0 | 跳过 2 | 已取消");
    }

    #[test]
    fn relative_library_root_follows_data_dir() {
        let config = Config {
            download_path: "media".into(),
            ..Config::default()
        };
        let engine = build_engine(&config, Some(Path::new("/srv/yarrharr"))).unwrap();
        assert_eq!(
            engine.profile().library_root,
            PathBuf::from("/srv/yarrharr/media")
        );
    }
}
