//! Categorized log events.
//!
//! Every user-facing message carries one of the categories below as a
//! `category` field so a presentation layer can style it.

use std::fmt;
use tracing::{error, info, warn};

/// Category of a user-facing log event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Info,
    Success,
    Warning,
    Error,
    Speed,
    Time,
    Location,
    Network,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogCategory::Info => "info",
            LogCategory::Success => "success",
            LogCategory::Warning => "warning",
            LogCategory::Error => "error",
            LogCategory::Speed => "speed",
            LogCategory::Time => "time",
            LogCategory::Location => "location",
            LogCategory::Network => "network",
        };
        f.write_str(name)
    }
}

/// Emit a categorized event
pub fn emit(category: LogCategory, message: impl AsRef<str>) {
    let message = message.as_ref();
    match category {
        LogCategory::Error => error!(category = %category, "{}", message),
        LogCategory::Warning => warn!(category = %category, "{}", message),
        _ => info!(category = %category, "{}", message),
    }
}

pub fn info(message: impl AsRef<str>) {
    emit(LogCategory::Info, message);
}

pub fn success(message: impl AsRef<str>) {
    emit(LogCategory::Success, message);
}

pub fn warning(message: impl AsRef<str>) {
    emit(LogCategory::Warning, message);
}

pub fn error(message: impl AsRef<str>) {
    emit(LogCategory::Error, message);
}

pub fn speed(message: impl AsRef<str>) {
    emit(LogCategory::Speed, message);
}

pub fn time(message: impl AsRef<str>) {
    emit(LogCategory::Time, message);
}

pub fn location(message: impl AsRef<str>) {
    emit(LogCategory::Location, message);
}

pub fn network(message: impl AsRef<str>) {
    emit(LogCategory::Network, message);
}
