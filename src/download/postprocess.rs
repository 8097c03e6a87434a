//! 下载后的容器转换（如 mkv → mp4）。只复制流并清空元数据，不转码。
//!
//! mp4 只能装文本字幕；mkv 里常见的图形字幕（PGS / VobSub）无法转为 mov_text，
//! 这种情况下第一次转换会失败，随后去掉字幕重试一次。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use super::error::EngineError;
use super::fetcher::{commit_part, create_part};
use super::models::{Container, TransferSession};
use super::process::ProcessRunner;
use super::progress::ProgressSink;
use super::remux::{FfmpegJob, Measure, Tracks, convert_args, drive};
use crate::base_system::cancel::CancelToken;

const PHASE: &str = "post-processing";

/// `raw` 已是目标容器时原样返回，否则转换为同名的目标扩展名文件并删除 `raw`。
///
/// 转换失败时 `raw` 保留，临时输出被清理。
#[allow(clippy::too_many_arguments)]
pub fn convert(
    runner: &dyn ProcessRunner,
    program: &Path,
    raw: &Path,
    target: Container,
    strip_fields: &[String],
    session: &mut TransferSession,
    sink: &mut dyn ProgressSink,
    cancel: &CancelToken,
    deadline: Option<Instant>,
) -> Result<PathBuf, EngineError> {
    let already = raw
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(target.extension()));
    if already {
        return Ok(raw.to_path_buf());
    }

    let dest = raw.with_extension(target.extension());
    let size = fs::metadata(raw).map_err(|e| EngineError::fs(raw, e))?.len();
    info!(target: "postprocess", from = %raw.display(), to = %dest.display(), "converting container");

    let mut run = |tracks: Tracks, session: &mut TransferSession| -> Result<(), EngineError> {
        let temp = create_part(&dest)?;
        let args = convert_args(raw, target, tracks, strip_fields, &temp);
        session.attach_artifact(temp);
        drive(
            runner,
            FfmpegJob {
                program,
                args,
                measure: Measure::Bytes(size),
                phase: PHASE,
            },
            session,
            &mut *sink,
            cancel,
            deadline,
        )
    };

    match run(Tracks::All { subtitles: true }, session) {
        Ok(()) => {}
        Err(EngineError::Process { exit_code, stderr_tail, .. }) if target == Container::Mp4 => {
            warn!(
                target: "postprocess",
                ?exit_code,
                stderr = %stderr_tail,
                "conversion with subtitles failed, retrying without subtitles"
            );
            // 丢弃上一次的临时输出
            drop(session.take_artifact());
            run(Tracks::All { subtitles: false }, session)?;
        }
        Err(err) => return Err(err),
    }
    commit_part(session, &dest)?;

    if let Err(e) = fs::remove_file(raw) {
        warn!(target: "postprocess", path = %raw.display(), error = %e, "failed to remove superseded artifact");
    }
    Ok(dest)
}
