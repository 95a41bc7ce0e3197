//! Output formatting module

mod colorize;
mod formatter;

pub use colorize::{risk_badge, risk_emoji, risk_label, ColorScheme};
pub use formatter::*;
