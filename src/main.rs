//! yarrharr：电影 / 剧集 / 游戏下载器。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/取消信号等基础设施
//! - `download`：下载引擎（路径规划、传输探测、直链下载、分段流重封装、容器转换）
//! - `ui`：命令行交互

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

mod base_system;
mod download;
mod ui;

use base_system::cancel::{CancelToken, install_ctrlc};
use base_system::config::{generate_yaml_with_comments, load_or_create};
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use download::models::{FinalContainer, MediaItem, ShowRef};
use tracing::{info, warn};
use ui::noui::Job;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "yarrharr")]
#[command(about = "Movie / TV show / game downloader")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs 等文件）
    #[arg(long)]
    data_dir: Option<String>,

    /// 下载完成后转换为 mp4（覆盖配置中的 final_container）
    #[arg(long, default_value_t = false)]
    mp4: bool,

    /// 单次下载总时限（秒），覆盖配置中的 transfer_deadline_secs
    #[arg(long)]
    deadline: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 下载电影
    Movie {
        /// TMDB ID
        id: String,
        title: String,
        /// 上映年份，也接受完整日期
        #[arg(long, default_value = "")]
        year: String,
    },
    /// 下载单集
    Episode {
        show_id: String,
        show_name: String,
        season: u32,
        episode: u32,
        #[arg(long, default_value = "")]
        title: String,
    },
    /// 按顺序下载一整季
    Season {
        show_id: String,
        show_name: String,
        season: u32,
        /// 剧集列表 JSON 文件（`-` 为标准输入）
        #[arg(long)]
        episodes: PathBuf,
    },
    /// 按顺序下载整部剧
    Show {
        show_id: String,
        show_name: String,
        /// 剧集列表 JSON 文件（`-` 为标准输入）
        #[arg(long)]
        episodes: PathBuf,
    },
    /// 下载游戏压缩包
    Game {
        id: String,
        title: String,
        /// 直链地址
        url: String,
    },
    /// 打印当前配置
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("yarrharr v{VERSION}");
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "yarrharr v{}", VERSION);

    let (mut config, config_path) =
        load_or_create::<Config>(data_dir).context("加载 config.yml 失败")?;
    if cli.mp4 {
        config.final_container = FinalContainer::Mp4;
    }
    if let Some(secs) = cli.deadline {
        config.transfer_deadline_secs = secs;
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let Some(job) = job_from(command) else {
        println!("# {}", config_path.display());
        print!("{}", generate_yaml_with_comments(&config)?);
        return Ok(());
    };

    let cancel = CancelToken::new();
    if let Err(err) = install_ctrlc(&cancel) {
        warn!(target: "startup", "无法注册 Ctrl+C 处理: {err}");
    }

    let ok = ui::noui::run(&config, data_dir, job, &cancel)?;
    drop(log);
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// `config` 子命令不产生下载任务。
fn job_from(command: Command) -> Option<Job> {
    let job = match command {
        Command::Movie { id, title, year } => Job::Single(MediaItem::Movie {
            id,
            title,
            release_year: year,
        }),
        Command::Episode {
            show_id,
            show_name,
            season,
            episode,
            title,
        } => Job::Single(MediaItem::Episode {
            show_id,
            show_name,
            season,
            episode,
            title,
        }),
        Command::Season {
            show_id,
            show_name,
            season,
            episodes,
        } => Job::Season {
            show: ShowRef {
                id: show_id,
                name: show_name,
            },
            season,
            episodes,
        },
        Command::Show {
            show_id,
            show_name,
            episodes,
        } => Job::Show {
            show: ShowRef {
                id: show_id,
                name: show_name,
            },
            episodes,
        },
        Command::Game { id, title, url } => Job::Single(MediaItem::Game {
            id,
            title,
            direct_link: url,
        }),
        Command::Config => return None,
    };
    Some(job)
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    LogSystem::init(LogOptions::cli(debug), base_dir).context("初始化日志失败")
}
