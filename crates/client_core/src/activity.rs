use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Shared "something is loading" flag. Every outstanding operation holds an
/// [`ActivityGuard`]; the indicator is busy while any guard is alive.
#[derive(Debug, Clone, Default)]
pub struct ActivityIndicator {
    active: Arc<AtomicUsize>,
}

impl ActivityIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> ActivityGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        ActivityGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active() > 0
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct ActivityGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
