//! 进度条渲染与终端输出。
//!
//! `render` 是纯函数，节流和速率状态都放在调用方的 `TransferSession` 里。

use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use indicatif::{FormattedDuration, HumanBytes};

pub const BAR_MAX_WIDTH: usize = 50;
/// 百分比与速率读数预留的列数。
pub const RESERVED_TEXT_WIDTH: usize = 40;
const FALLBACK_WIDTH: usize = 80;

const FILLED: char = '=';
const EDGE: char = '>';
const EMPTY: char = ' ';

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readout {
    Bytes {
        done: u64,
        total: Option<u64>,
        per_sec: f64,
    },
    Media {
        position: Duration,
        speed: Option<f64>,
        size: Option<u64>,
    },
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Readout::Bytes {
                done,
                total,
                per_sec,
            } => {
                write!(f, "{}", HumanBytes(done))?;
                if let Some(total) = total {
                    write!(f, "/{}", HumanBytes(total))?;
                }
                write!(f, " @ {}/s", HumanBytes(per_sec.max(0.0) as u64))
            }
            Readout::Media {
                position,
                speed,
                size,
            } => {
                write!(f, "{}", FormattedDuration(position))?;
                if let Some(speed) = speed {
                    write!(f, " @ {speed:.2}x")?;
                }
                if let Some(size) = size {
                    write!(f, " ({})", HumanBytes(size))?;
                }
                Ok(())
            }
        }
    }
}

pub fn bar_width(terminal_width: usize) -> usize {
    BAR_MAX_WIDTH.min(terminal_width.saturating_sub(RESERVED_TEXT_WIDTH))
}

/// 渲染一行进度：`[=====>     ]  42.0% <readout>`，超出终端宽度时整行截断。
pub fn render(fraction: f64, readout: &Readout, terminal_width: usize) -> String {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let width = bar_width(terminal_width);
    let mut line = String::with_capacity(terminal_width.max(16));
    if width > 0 {
        let filled = (fraction * width as f64).floor() as usize;
        line.push('[');
        for i in 0..width {
            line.push(if i < filled {
                FILLED
            } else if i == filled {
                EDGE
            } else {
                EMPTY
            });
        }
        line.push_str("] ");
    }
    line.push_str(&format!("{:5.1}% {readout}", fraction * 100.0));

    truncate(line, terminal_width)
}

fn truncate(line: String, width: usize) -> String {
    if line.chars().count() <= width {
        return line;
    }
    if width <= 3 {
        return line.chars().take(width).collect();
    }
    let mut out: String = line.chars().take(width - 3).collect();
    out.push_str("...");
    out
}

/// 进度输出目标。回调在读循环内同步执行，实现必须廉价且不阻塞。
pub trait ProgressSink {
    fn width(&self) -> usize;
    fn draw(&mut self, line: &str);
    fn finish(&mut self);
}

/// 写到 stderr 的单行进度条；stderr 不是终端时什么也不画。
#[derive(Debug)]
pub struct TerminalSink {
    enabled: bool,
    drawn: bool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            enabled: io::stderr().is_terminal(),
            drawn: false,
        }
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalSink {
    fn width(&self) -> usize {
        crossterm::terminal::size()
            .map(|(w, _)| w as usize)
            .ok()
            .filter(|w| *w > 0)
            .unwrap_or(FALLBACK_WIDTH)
    }

    fn draw(&mut self, line: &str) {
        if !self.enabled {
            return;
        }
        let mut err = io::stderr().lock();
        let _ = write!(err, "\r\x1b[2K{line}");
        let _ = err.flush();
        self.drawn = true;
    }

    fn finish(&mut self) {
        if self.drawn {
            let _ = writeln!(io::stderr());
            self.drawn = false;
        }
    }
}
