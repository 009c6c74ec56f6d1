//! Host message reporting
//!
//! The VM never prints; every diagnostic goes through the host-provided
//! message callback, filtered by a minimum level.

use std::sync::Arc;

/// Severity of a reported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageKind {
    /// Chatty progress detail
    Verbose,
    /// Informational
    Info,
    /// Something suspicious but recoverable
    Warning,
    /// An operation failed
    Error,
    /// An unrecoverable failure
    Fatal,
}

/// Host message callback.
pub type MessageFn = Arc<dyn Fn(MessageKind, &str) + Send + Sync>;

/// Host dependency-request callback, invoked with the dependency's name.
pub type DependencyFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Message reporter bound to a host callback and a level filter.
#[derive(Clone)]
pub struct Report {
    callback: Option<MessageFn>,
    level: MessageKind,
}

impl Report {
    /// Create a reporter. Messages below `level` are dropped.
    pub fn new(callback: Option<MessageFn>, level: MessageKind) -> Self {
        Self { callback, level }
    }

    /// Report a message at the given level.
    pub fn message(&self, kind: MessageKind, text: &str) {
        if kind < self.level {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(kind, text);
        }
    }

    /// Report at [`MessageKind::Verbose`].
    pub fn verbose(&self, text: &str) {
        self.message(MessageKind::Verbose, text);
    }

    /// Report at [`MessageKind::Info`].
    pub fn info(&self, text: &str) {
        self.message(MessageKind::Info, text);
    }

    /// Report at [`MessageKind::Warning`].
    pub fn warning(&self, text: &str) {
        self.message(MessageKind::Warning, text);
    }

    /// Report at [`MessageKind::Error`].
    pub fn error(&self, text: &str) {
        self.message(MessageKind::Error, text);
    }

    /// Report at [`MessageKind::Fatal`].
    pub fn fatal(&self, text: &str) {
        self.message(MessageKind::Fatal, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_level_filter() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let report = Report::new(
            Some(Arc::new(move |kind, text: &str| {
                sink.lock().unwrap().push((kind, text.to_owned()));
            })),
            MessageKind::Warning,
        );

        report.verbose("dropped");
        report.warning("kept");
        report.error("kept too");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (MessageKind::Warning, "kept".to_owned()));
    }

    #[test]
    fn test_no_callback_is_silent() {
        let report = Report::new(None, MessageKind::Verbose);
        report.fatal("nobody listening");
    }
}
