//! 传输方式探测：只发 HEAD，不取正文。
//!
//! 声明为 HLS 播放列表的走分段流重封装，其余情况（含探测出错、超时）一律回落为直链下载。

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::error::ProbeFailure;
use super::models::{MAX_PROBE_TIMEOUT, TransportStrategy};

pub const API_KEY_HEADER: &str = "X-API-Key";

const SEGMENTED_TYPES: [&str; 2] = ["application/vnd.apple.mpegurl", "application/x-mpegurl"];

#[derive(Debug)]
pub struct ProbeOutcome {
    pub strategy: TransportStrategy,
    pub content_type: Option<String>,
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    fn fallback(failure: ProbeFailure) -> Self {
        Self {
            strategy: TransportStrategy::Progressive,
            content_type: None,
            failure: Some(failure),
        }
    }
}

pub fn classify_content_type(content_type: Option<&str>) -> TransportStrategy {
    let Some(raw) = content_type else {
        return TransportStrategy::Progressive;
    };
    let mime = raw.split(';').next().unwrap_or("").trim();
    if SEGMENTED_TYPES
        .iter()
        .any(|t| mime.eq_ignore_ascii_case(t))
    {
        TransportStrategy::SegmentedStream
    } else {
        TransportStrategy::Progressive
    }
}

pub(crate) fn with_token(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token.filter(|t| !t.is_empty()) {
        Some(t) => builder.header(API_KEY_HEADER, t),
        None => builder,
    }
}

/// 探测给定地址；超时上限固定为 10 秒。
pub fn probe(client: &Client, url: &str, token: Option<&str>, timeout: Duration) -> ProbeOutcome {
    let timeout = timeout.min(MAX_PROBE_TIMEOUT);
    let resp = match with_token(client.head(url), token).timeout(timeout).send() {
        Ok(r) => r,
        Err(e) => {
            let failure = if e.is_timeout() {
                ProbeFailure::Timeout
            } else {
                ProbeFailure::Transport(e.to_string())
            };
            warn!(target: "transport", %url, error = %failure, "probe failed, falling back to progressive");
            return ProbeOutcome::fallback(failure);
        }
    };

    let status = resp.status();
    if !status.is_success() {
        let failure = ProbeFailure::Status(status.as_u16());
        warn!(target: "transport", %url, error = %failure, "probe failed, falling back to progressive");
        return ProbeOutcome::fallback(failure);
    }

    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let strategy = classify_content_type(content_type.as_deref());
    debug!(target: "transport", %url, content_type = ?content_type, %strategy, "probe classified");

    ProbeOutcome {
        strategy,
        content_type,
        failure: None,
    }
}
