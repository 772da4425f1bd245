use colored::{Color, Colorize};
use std::fmt;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Header,
    Info,
    Success,
    Warning,
    Failure,
}

impl Level {
    pub fn color(self) -> Color {
        match self {
            Level::Header => Color::BrightMagenta,
            Level::Info => Color::BrightBlue,
            Level::Success => Color::BrightGreen,
            Level::Warning => Color::BrightYellow,
            Level::Failure => Color::BrightRed,
        }
    }
}

/// Render `txt` in the color of `level`, colors are dropped when stdout is
/// not a terminal or `NO_COLOR` is set.
pub fn paint<T: fmt::Display>(txt: T, level: Level) -> String {
    txt.to_string().color(level.color()).to_string()
}

pub fn writeln<W: io::Write, T: fmt::Display>(w: &mut W, txt: T, level: Level) -> io::Result<()> {
    writeln!(w, "{}", paint(txt, level))
}
