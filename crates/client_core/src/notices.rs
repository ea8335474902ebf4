//! Transient banners shown after uploads.
//!
//! There is one slot per kind. Posting replaces whatever the slot held and
//! arms a timer; the timer only clears the slot if it still holds the notice
//! it was armed for.

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;

pub const SUCCESS_NOTICE_LIFETIME: Duration = Duration::from_millis(3000);
pub const ERROR_NOTICE_LIFETIME: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

impl NoticeKind {
    pub fn lifetime(self) -> Duration {
        match self {
            Self::Success => SUCCESS_NOTICE_LIFETIME,
            Self::Error => ERROR_NOTICE_LIFETIME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub text: String,
}

#[derive(Debug, Default)]
struct NoticeSlots {
    next_id: u64,
    success: Option<Notice>,
    error: Option<Notice>,
}

impl NoticeSlots {
    fn slot(&mut self, kind: NoticeKind) -> &mut Option<Notice> {
        match kind {
            NoticeKind::Success => &mut self.success,
            NoticeKind::Error => &mut self.error,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Notices {
    slots: Arc<Mutex<NoticeSlots>>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn post(&self, kind: NoticeKind, text: impl Into<String>) -> Notice {
        let notice = {
            let mut slots = self.slots.lock().await;
            slots.next_id += 1;
            let notice = Notice {
                id: slots.next_id,
                kind,
                text: text.into(),
            };
            *slots.slot(kind) = Some(notice.clone());
            notice
        };

        let slots = Arc::clone(&self.slots);
        let id = notice.id;
        tokio::spawn(async move {
            tokio::time::sleep(kind.lifetime()).await;
            let mut slots = slots.lock().await;
            let slot = slots.slot(kind);
            if slot.as_ref().is_some_and(|current| current.id == id) {
                *slot = None;
            }
        });

        notice
    }

    /// Visible notices, success first.
    pub async fn current(&self) -> Vec<Notice> {
        let slots = self.slots.lock().await;
        slots
            .success
            .iter()
            .chain(slots.error.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/notices_tests.rs"]
mod tests;
