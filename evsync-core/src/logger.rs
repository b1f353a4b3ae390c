//! Logger capability consumed by the Graph client and the processors.
//!
//! Components take an `Arc<dyn Logger>` at construction time. The default is
//! [`TracingLogger`], which forwards to the `tracing` macros; [`NoopLogger`]
//! discards everything and [`MemoryLogger`] keeps records in memory.

use std::fmt::{Display, Write as _};
use std::sync::{Arc, Mutex, PoisonError};

/// Structured key/value pairs attached to a log record.
pub type Fields<'a> = &'a [(&'static str, &'a dyn Display)];

pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str, fields: Fields<'_>);
    fn info(&self, msg: &str, fields: Fields<'_>);
    fn warn(&self, msg: &str, fields: Fields<'_>);
    fn error(&self, msg: &str, err: Option<&dyn std::error::Error>, fields: Fields<'_>);
}

/// Render fields as `key=value` pairs separated by spaces.
pub fn render_fields(fields: Fields<'_>) -> String {
    let mut out = String::new();
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{key}={value}");
    }
    out
}

/// Fields the Graph client logs on every request path. These become real
/// `tracing` fields; anything else is rendered into a single `fields` string.
#[derive(Debug, Default, PartialEq, Eq)]
struct SplitFields {
    endpoint: Option<String>,
    page_id: Option<String>,
    attempt: Option<String>,
    max_attempts: Option<String>,
    status: Option<String>,
    delay_ms: Option<String>,
    kind: Option<String>,
    pages: Option<String>,
    items: Option<String>,
    rest: Option<String>,
}

impl SplitFields {
    fn new(fields: Fields<'_>) -> Self {
        let mut split = SplitFields::default();
        let mut rest = Vec::new();
        for &(key, value) in fields {
            let slot = match key {
                "endpoint" => &mut split.endpoint,
                "page_id" => &mut split.page_id,
                "attempt" => &mut split.attempt,
                "max_attempts" => &mut split.max_attempts,
                "status" => &mut split.status,
                "delay_ms" => &mut split.delay_ms,
                "kind" => &mut split.kind,
                "pages" => &mut split.pages,
                "items" => &mut split.items,
                _ => {
                    rest.push((key, value));
                    continue;
                }
            };
            *slot = Some(value.to_string());
        }
        if !rest.is_empty() {
            split.rest = Some(render_fields(&rest));
        }
        split
    }
}

macro_rules! emit {
    ($level:expr, $msg:expr, $fields:expr, $err:expr) => {{
        let f = SplitFields::new($fields);
        let err = $err.map(tracing::field::display);
        tracing::event!(
            target: "evsync_core::graph",
            $level,
            endpoint = f.endpoint.as_deref(),
            page_id = f.page_id.as_deref(),
            attempt = f.attempt.as_deref(),
            max_attempts = f.max_attempts.as_deref(),
            status = f.status.as_deref(),
            delay_ms = f.delay_ms.as_deref(),
            kind = f.kind.as_deref(),
            pages = f.pages.as_deref(),
            items = f.items.as_deref(),
            fields = f.rest.as_deref(),
            error = err,
            "{}",
            $msg
        )
    }};
}

/// Forwards to `tracing` under the `evsync_core::graph` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, msg: &str, fields: Fields<'_>) {
        emit!(tracing::Level::DEBUG, msg, fields, None::<&dyn std::error::Error>);
    }

    fn info(&self, msg: &str, fields: Fields<'_>) {
        emit!(tracing::Level::INFO, msg, fields, None::<&dyn std::error::Error>);
    }

    fn warn(&self, msg: &str, fields: Fields<'_>) {
        emit!(tracing::Level::WARN, msg, fields, None::<&dyn std::error::Error>);
    }

    fn error(&self, msg: &str, err: Option<&dyn std::error::Error>, fields: Fields<'_>) {
        emit!(tracing::Level::ERROR, msg, fields, err);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _msg: &str, _fields: Fields<'_>) {}
    fn info(&self, _msg: &str, _fields: Fields<'_>) {}
    fn warn(&self, _msg: &str, _fields: Fields<'_>) {}
    fn error(&self, _msg: &str, _err: Option<&dyn std::error::Error>, _fields: Fields<'_>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// A captured log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl Record {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every record in memory. Cloning shares the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records at `level`, oldest first.
    pub fn at(&self, level: Level) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .collect()
    }

    fn push(&self, level: Level, msg: &str, fields: Fields<'_>) {
        let record = Record {
            level,
            message: msg.to_string(),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

impl Logger for MemoryLogger {
    fn debug(&self, msg: &str, fields: Fields<'_>) {
        self.push(Level::Debug, msg, fields);
    }

    fn info(&self, msg: &str, fields: Fields<'_>) {
        self.push(Level::Info, msg, fields);
    }

    fn warn(&self, msg: &str, fields: Fields<'_>) {
        self.push(Level::Warn, msg, fields);
    }

    fn error(&self, msg: &str, err: Option<&dyn std::error::Error>, fields: Fields<'_>) {
        match err {
            Some(err) => {
                let err = err.to_string();
                let err_ref: &dyn Display = &err;
                let mut with_error = vec![("error", err_ref)];
                with_error.extend_from_slice(fields);
                self.push(Level::Error, msg, &with_error);
            }
            None => self.push(Level::Error, msg, fields),
        }
    }
}

/// The logger components fall back to when none is injected.
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_fields_in_order() {
        let attempt = 2u32;
        let status = 503u16;
        assert_eq!(
            render_fields(&[("attempt", &attempt), ("status", &status)]),
            "attempt=2 status=503"
        );
        assert_eq!(render_fields(&[]), "");
    }

    #[test]
    fn common_keys_become_their_own_fields() {
        let attempt = 2u32;
        let delay = 400u64;
        let merged = 7usize;
        let split = SplitFields::new(&[
            ("attempt", &attempt),
            ("merged", &merged),
            ("delay_ms", &delay),
            ("endpoint", &"/me/accounts"),
            ("upcoming", &3),
        ]);
        assert_eq!(split.attempt.as_deref(), Some("2"));
        assert_eq!(split.delay_ms.as_deref(), Some("400"));
        assert_eq!(split.endpoint.as_deref(), Some("/me/accounts"));
        assert_eq!(split.status, None);
        assert_eq!(split.rest.as_deref(), Some("merged=7 upcoming=3"));

        assert_eq!(SplitFields::new(&[]), SplitFields::default());
    }

    #[test]
    fn memory_logger_captures_levels() {
        let logger = MemoryLogger::new();
        let shared = logger.clone();
        shared.info("fetched", &[("items", &3)]);
        let err = std::io::Error::other("boom");
        shared.error("failed", Some(&err), &[("page_id", &"p1")]);

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field("items"), Some("3"));
        let errors = logger.at(Level::Error);
        assert_eq!(errors[0].field("error"), Some("boom"));
        assert_eq!(errors[0].field("page_id"), Some("p1"));
    }
}
