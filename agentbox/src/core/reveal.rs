//! Cooperative progressive-reveal task for one display surface.
//!
//! States are `Idle` and `Animating(target)`. Starting a reveal hands out a
//! fresh token and supersedes whatever was running. A running reveal checks
//! its token before every suspension point and stops quietly once it is no
//! longer current, so two reveals never write to the same surface at once.
//!
//! Single-threaded by construction (`Cell`/`RefCell`, not `Sync`).

use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealPhase {
    Idle,
    Animating { target: String },
}

/// Proof that a reveal was started; compared against the current generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealToken {
    generation: u64,
    target: String,
}

impl RevealToken {
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[derive(Debug, Default)]
pub struct Revealer {
    generation: Cell<u64>,
    target: RefCell<Option<String>>,
}

impl Revealer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin revealing `target`, superseding any reveal in flight.
    pub fn start(&self, target: impl Into<String>) -> RevealToken {
        let target = target.into();
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        *self.target.borrow_mut() = Some(target.clone());
        RevealToken { generation, target }
    }

    /// Whether the holder of `token` may keep writing.
    pub fn is_current(&self, token: &RevealToken) -> bool {
        token.generation == self.generation.get()
    }

    /// Mark the reveal finished. Ignored when `token` was superseded.
    pub fn finish(&self, token: &RevealToken) {
        if self.is_current(token) {
            *self.target.borrow_mut() = None;
        }
    }

    /// Stop whatever is running without starting anything new.
    pub fn cancel(&self) {
        self.generation.set(self.generation.get() + 1);
        *self.target.borrow_mut() = None;
    }

    pub fn phase(&self) -> RevealPhase {
        match self.target.borrow().as_ref() {
            None => RevealPhase::Idle,
            Some(target) => RevealPhase::Animating {
                target: target.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        assert_eq!(Revealer::new().phase(), RevealPhase::Idle);
    }

    #[test]
    fn new_target_supersedes_old_token() {
        let revealer = Revealer::new();
        let first = revealer.start("a.txt");
        assert!(revealer.is_current(&first));

        let second = revealer.start("b.txt");
        assert!(!revealer.is_current(&first));
        assert!(revealer.is_current(&second));
        assert_eq!(
            revealer.phase(),
            RevealPhase::Animating {
                target: "b.txt".to_string()
            }
        );

        revealer.finish(&first);
        assert_eq!(
            revealer.phase(),
            RevealPhase::Animating {
                target: "b.txt".to_string()
            }
        );
        revealer.finish(&second);
        assert_eq!(revealer.phase(), RevealPhase::Idle);
    }

    #[test]
    fn restarting_same_target_invalidates_previous_run() {
        let revealer = Revealer::new();
        let first = revealer.start("a.txt");
        let again = revealer.start("a.txt");
        assert_eq!(first.target(), again.target());
        assert!(!revealer.is_current(&first));
    }

    #[test]
    fn cancel_returns_to_idle() {
        let revealer = Revealer::new();
        let token = revealer.start("a.txt");
        revealer.cancel();
        assert!(!revealer.is_current(&token));
        assert_eq!(revealer.phase(), RevealPhase::Idle);
    }
}
