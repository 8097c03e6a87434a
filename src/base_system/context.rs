//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息，以及到引擎参数的转换。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigFile, FieldMeta};
use crate::download::downloader::LibraryProfile;
use crate::download::models::{
    EngineSettings, FinalContainer, MAX_PROBE_TIMEOUT, default_strip_metadata_fields,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 路径配置
    #[serde(default = "default_download_path")]
    pub download_path: String,

    // 内容源
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub api_key: String,

    // 下载行为
    #[serde(default)]
    pub final_container: FinalContainer,
    #[serde(default = "default_true")]
    pub skip_specials: bool,

    // 网络配置
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub transfer_deadline_secs: u64,

    // 外部工具
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_segmented_ceiling_secs")]
    pub segmented_ceiling_secs: u64,
    #[serde(default = "default_strip_metadata_fields")]
    pub strip_metadata_fields: Vec<String>,

    // 界面
    #[serde(default = "default_render_interval_ms")]
    pub render_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            api_base_url: default_api_base_url(),
            api_key: String::new(),
            final_container: FinalContainer::default(),
            skip_specials: default_true(),
            probe_timeout_secs: default_probe_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            transfer_deadline_secs: 0,
            ffmpeg_path: default_ffmpeg_path(),
            segmented_ceiling_secs: default_segmented_ceiling_secs(),
            strip_metadata_fields: default_strip_metadata_fields(),
            render_interval_ms: default_render_interval_ms(),
        }
    }
}

impl ConfigFile for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 12] = [
            FieldMeta {
                name: "download_path",
                description: "媒体库根目录（Movies / TV Shows / Games 建在其下）",
            },
            FieldMeta {
                name: "api_base_url",
                description: "内容源地址，请求形如 <url>?tmdbId=<id>[&season=<n>&episode=<m>]",
            },
            FieldMeta {
                name: "api_key",
                description: "API Key，非空时以 X-API-Key 请求头发送",
            },
            FieldMeta {
                name: "final_container",
                description: "最终容器，可选: [keep, mp4]；mp4 需要 ffmpeg",
            },
            FieldMeta {
                name: "skip_specials",
                description: "下载整季/整剧时跳过第 0 季（特别篇）",
            },
            FieldMeta {
                name: "probe_timeout_secs",
                description: "传输方式探测超时（秒，最大 10）",
            },
            FieldMeta {
                name: "connect_timeout_secs",
                description: "连接超时（秒）",
            },
            FieldMeta {
                name: "transfer_deadline_secs",
                description: "单次下载总时限（秒），0 表示不限制",
            },
            FieldMeta {
                name: "ffmpeg_path",
                description: "ffmpeg 可执行文件路径",
            },
            FieldMeta {
                name: "segmented_ceiling_secs",
                description: "分段流进度估算所用的时长上限（秒）",
            },
            FieldMeta {
                name: "strip_metadata_fields",
                description: "重封装时清空的元数据字段",
            },
            FieldMeta {
                name: "render_interval_ms",
                description: "进度条最小刷新间隔（毫秒）",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn library_root(&self) -> PathBuf {
        if self.download_path.trim().is_empty() {
            PathBuf::from(default_download_path())
        } else {
            PathBuf::from(self.download_path.trim())
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        EngineSettings {
            probe_timeout: Duration::from_secs(self.probe_timeout_secs).min(MAX_PROBE_TIMEOUT),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            deadline: (self.transfer_deadline_secs > 0)
                .then(|| Duration::from_secs(self.transfer_deadline_secs)),
            ffmpeg: if self.ffmpeg_path.trim().is_empty() {
                defaults.ffmpeg
            } else {
                PathBuf::from(self.ffmpeg_path.trim())
            },
            segmented_ceiling: if self.segmented_ceiling_secs == 0 {
                defaults.segmented_ceiling
            } else {
                Duration::from_secs(self.segmented_ceiling_secs)
            },
            render_interval: Duration::from_millis(self.render_interval_ms),
            strip_metadata_fields: self.strip_metadata_fields.clone(),
        }
    }

    pub fn library_profile(&self) -> LibraryProfile {
        LibraryProfile {
            library_root: self.library_root(),
            api_base_url: self.api_base_url.trim().to_string(),
            api_key: Some(self.api_key.trim().to_string()).filter(|k| !k.is_empty()),
            final_container: self.final_container,
            skip_specials: self.skip_specials,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_download_path() -> String {
    "downloads".to_string()
}

fn default_api_base_url() -> String {
    "https://sleepy.engineer/api/yarrharr/direct".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_segmented_ceiling_secs() -> u64 {
    12_600
}

fn default_render_interval_ms() -> u64 {
    100
}
