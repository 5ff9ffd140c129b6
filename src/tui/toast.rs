//! Toast notifications
//!
//! Short-lived notices shown over the result list, used for search failures
//! and failed previews. A toast hides itself once its time is up.

use std::time::{Duration, Instant};

/// How long a notice stays on screen.
pub const TOAST_DURATION: Duration = Duration::from_secs(4);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToastType {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, Default)]
pub struct ToastState {
    current: Option<Toast>,
}

#[derive(Clone, Debug)]
pub struct Toast {
    pub message: String,
    pub toast_type: ToastType,
    show_until: Instant,
}

impl ToastState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, message: impl Into<String>, toast_type: ToastType, duration: Duration) {
        self.current = Some(Toast {
            message: message.into(),
            toast_type,
            show_until: Instant::now() + duration,
        });
    }

    /// Hide the toast once it has expired.
    pub fn update(&mut self) {
        if self
            .current
            .as_ref()
            .is_some_and(|t| Instant::now() >= t.show_until)
        {
            self.current = None;
        }
    }

    pub fn hide(&mut self) {
        self.current = None;
    }

    pub fn visible(&self) -> Option<&Toast> {
        self.current.as_ref()
    }
}
