//! 媒体库目录布局与文件名清洗。
//!
//! - 电影：`<root>/Movies/<Title> (<Year>).<ext>`
//! - 剧集：`<root>/TV Shows/<Show>/Season NN/<Show> - SNNEMM - <Episode>.<ext>`
//! - 游戏：`<root>/Games/<Title>.rar`
//!
//! 扩展名在探测传输方式之后才确定，所以规划结果只包含目录与文件名主体。

use std::fs;
use std::path::{Path, PathBuf};

use super::error::EngineError;
use super::models::{Container, MediaItem};

const INVALID_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

pub const MOVIES_DIR: &str = "Movies";
pub const SHOWS_DIR: &str = "TV Shows";
pub const GAMES_DIR: &str = "Games";

/// 删除（不替换）文件名非法字符；幂等。
pub fn sanitize(name: &str) -> String {
    name.chars().filter(|c| !INVALID_CHARS.contains(c)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPath {
    dir: PathBuf,
    stem: String,
}

impl PlannedPath {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn file(&self, container: Container) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.stem, container.extension()))
    }

    /// 幂等创建目标目录。
    pub fn ensure_dir(&self) -> Result<(), EngineError> {
        fs::create_dir_all(&self.dir).map_err(|e| EngineError::fs(&self.dir, e))
    }
}

pub fn plan(item: &MediaItem, root: &Path) -> Result<PlannedPath, EngineError> {
    let root = std::path::absolute(root).map_err(|e| EngineError::fs(root, e))?;

    match item {
        MediaItem::Movie {
            title,
            release_year,
            ..
        } => {
            let title = named(title, "movie title")?;
            let year: String = release_year.trim().chars().take(4).collect();
            let stem = if year.is_empty() {
                title
            } else {
                sanitize(&format!("{title} ({year})"))
            };
            Ok(PlannedPath {
                dir: root.join(MOVIES_DIR),
                stem,
            })
        }
        MediaItem::Episode {
            show_name,
            season,
            episode,
            title,
            ..
        } => {
            let show = named(show_name, "show name")?;
            if show == "." || show == ".." {
                return Err(EngineError::InvalidName(format!(
                    "show name {show_name:?} is not a usable directory name"
                )));
            }
            let stem = format!(
                "{show} - S{season:02}E{episode:02} - {}",
                sanitize(title)
            );
            Ok(PlannedPath {
                dir: root
                    .join(SHOWS_DIR)
                    .join(&show)
                    .join(format!("Season {season:02}")),
                stem,
            })
        }
        MediaItem::Game { title, .. } => Ok(PlannedPath {
            dir: root.join(GAMES_DIR),
            stem: named(title, "game title")?,
        }),
    }
}

fn named(raw: &str, what: &str) -> Result<String, EngineError> {
    let cleaned = sanitize(raw);
    if cleaned.trim().is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{what} {raw:?} is empty after sanitizing"
        )));
    }
    Ok(cleaned)
}
