//! Screen controllers
//!
//! Each controller owns the state one screen renders. A screen is
//! "mounted" for as long as the UI holds its [`ScreenScope`]; controllers
//! keep a [`Liveness`] and drop results that arrive after unmount.

mod composer;
mod notifications;
mod profile;
mod share;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use composer::Composer;
pub use notifications::NotificationsScreen;
pub use profile::{ProfileEditor, ProfileForm};
pub use share::{ShareContent, share_content, share_message};

/// Mount guard held by the UI; unmounts on drop
#[derive(Debug)]
pub struct ScreenScope {
    alive: Arc<AtomicBool>,
}

impl ScreenScope {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn liveness(&self) -> Liveness {
        Liveness(self.alive.clone())
    }
}

impl Default for ScreenScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScreenScope {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Whether the owning screen is still mounted
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Never unmounts; for controllers driven without a UI
    pub fn detached() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_scope_unmounts() {
        let scope = ScreenScope::new();
        let liveness = scope.liveness();
        let copy = liveness.clone();
        assert!(liveness.is_alive());

        drop(scope);
        assert!(!liveness.is_alive());
        assert!(!copy.is_alive());
    }
}
