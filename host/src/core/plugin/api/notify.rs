//! Notifications and the activity log
//!
//! Transient toasts plus the timestamped console log the user sees. Every
//! user-visible failure goes through both.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};

/// Default toast lifetime
pub const DEFAULT_NOTIFICATION_MS: i64 = 4000;

/// Oldest lines are dropped past this size
const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    /// Zero keeps the toast until dismissed
    pub duration_ms: i64,
    pub shown_at: DateTime<Local>,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        self.duration_ms > 0 && now - self.shown_at >= Duration::milliseconds(self.duration_ms)
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    active: Vec<Notification>,
    log: Vec<String>,
}

/// Shared toast queue and activity log
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    state: Rc<RefCell<NotifierState>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self, title: &str, message: &str, kind: NotificationKind) {
        self.show_for(title, message, kind, DEFAULT_NOTIFICATION_MS);
    }

    pub fn show_for(&self, title: &str, message: &str, kind: NotificationKind, duration_ms: i64) {
        tracing::debug!("Notification [{:?}] {}: {}", kind, title, message);
        self.state.borrow_mut().active.push(Notification {
            title: title.to_string(),
            message: message.to_string(),
            kind,
            duration_ms: duration_ms.max(0),
            shown_at: Local::now(),
        });
    }

    /// Toasts still on screen at `now`; expired ones are dropped
    pub fn active(&self, now: DateTime<Local>) -> Vec<Notification> {
        let mut state = self.state.borrow_mut();
        state.active.retain(|n| !n.is_expired(now));
        state.active.clone()
    }

    pub fn dismiss_all(&self) {
        self.state.borrow_mut().active.clear();
    }

    /// Appends `[HH:MM:SS] message` to the activity log
    pub fn log(&self, message: &str) {
        tracing::info!("{}", message);
        self.push_line(format!("[{}] {}", Local::now().format("%H:%M:%S"), message));
    }

    /// Appends `[HH:MM:SS] ERROR: message` to the activity log
    pub fn log_error(&self, message: &str) {
        tracing::error!("{}", message);
        self.push_line(format!(
            "[{}] ERROR: {}",
            Local::now().format("%H:%M:%S"),
            message
        ));
    }

    /// Error toast plus error log line
    pub fn report_failure(&self, title: &str, message: &str) {
        self.log_error(&format!("{title}: {message}"));
        self.show(title, message, NotificationKind::Error);
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    pub fn last_log_line(&self) -> Option<String> {
        self.state.borrow().log.last().cloned()
    }

    fn push_line(&self, line: String) {
        let mut state = self.state.borrow_mut();
        state.log.push(line);
        if state.log.len() > MAX_LOG_LINES {
            let overflow = state.log.len() - MAX_LOG_LINES;
            state.log.drain(..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_lines_are_timestamped() {
        let notifier = Notifier::new();
        notifier.log_error("Failed to load extension 'img'");

        let line = notifier.last_log_line().unwrap();
        assert!(line.starts_with('['));
        assert_eq!(&line[9..], "] ERROR: Failed to load extension 'img'");
    }

    #[test]
    fn notifications_expire_after_duration() {
        let notifier = Notifier::new();
        notifier.show("Saved", "main.py", NotificationKind::Success);
        notifier.show_for("Sticky", "", NotificationKind::Info, 0);

        let now = Local::now();
        assert_eq!(notifier.active(now).len(), 2);

        let later = now + Duration::milliseconds(DEFAULT_NOTIFICATION_MS + 1);
        let remaining = notifier.active(later);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "Sticky");
    }

    #[test]
    fn report_failure_writes_toast_and_log() {
        let notifier = Notifier::new();
        notifier.report_failure("Extension error", "boom");

        let active = notifier.active(Local::now());
        assert_eq!(active[0].kind, NotificationKind::Error);
        assert!(notifier.last_log_line().unwrap().ends_with("ERROR: Extension error: boom"));
    }

    #[test]
    fn log_is_bounded() {
        let notifier = Notifier::new();
        for i in 0..(MAX_LOG_LINES + 10) {
            notifier.log(&format!("line {i}"));
        }
        let lines = notifier.log_lines();
        assert_eq!(lines.len(), MAX_LOG_LINES);
        assert!(lines[0].ends_with("line 10"));
    }
}
