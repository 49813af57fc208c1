//! Approve/reject state machine over a single pending change set.
//!
//! ```text
//! Empty --propose(non-empty)--> Proposed --discard--> Empty
//!                                   |
//!                                   +--begin_commit--> Empty (set handed to the committer)
//! ```
//!
//! The active path only drives display; a commit always applies the whole
//! set. A proposal never expires and blocks new proposals until resolved.
//! Alongside the set, a proposal keeps the content each changed path had when
//! it was submitted, so it can be shown against what the agent actually saw.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::snapshot::Snapshot;
use crate::core::types::ChangeSet;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("a change set with {pending} path(s) is already awaiting review")]
    AlreadyProposed { pending: usize },
    #[error("no change set is awaiting review")]
    NothingProposed,
    #[error("path '{path}' is not part of the pending change set")]
    UnknownPath { path: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ReviewState {
    #[default]
    Empty,
    Proposed {
        changes: ChangeSet,
        /// Submitted content of changed paths; absent for added files.
        #[serde(default)]
        originals: BTreeMap<String, String>,
        active: String,
    },
}

impl ReviewState {
    /// Offer a run result for review.
    ///
    /// `submitted` is the snapshot the run started from. Returns `Ok(false)`
    /// and stays `Empty` when the set has no changes.
    pub fn propose(&mut self, changes: ChangeSet, submitted: &Snapshot) -> Result<bool, ReviewError> {
        if let ReviewState::Proposed { changes: pending, .. } = self {
            return Err(ReviewError::AlreadyProposed {
                pending: pending.len(),
            });
        }
        let Some(active) = changes.paths().next().map(str::to_string) else {
            return Ok(false);
        };
        let originals = changes
            .paths()
            .filter_map(|path| {
                let content = submitted.get(path)?;
                Some((path.to_string(), String::from_utf8_lossy(content).into_owned()))
            })
            .collect();
        *self = ReviewState::Proposed {
            changes,
            originals,
            active,
        };
        Ok(true)
    }

    /// Make `path` the displayed entry.
    pub fn select(&mut self, path: &str) -> Result<(), ReviewError> {
        match self {
            ReviewState::Empty => Err(ReviewError::NothingProposed),
            ReviewState::Proposed {
                changes, active, ..
            } => {
                if !changes.contains(path) {
                    return Err(ReviewError::UnknownPath {
                        path: path.to_string(),
                    });
                }
                *active = path.to_string();
                Ok(())
            }
        }
    }

    /// Drop the proposal without writing anything.
    pub fn discard(&mut self) -> Result<ChangeSet, ReviewError> {
        self.take()
    }

    /// Hand the whole set to the committer.
    ///
    /// The state is `Empty` afterwards whatever the commit outcome; failed
    /// paths are reported by the commit, not kept here.
    pub fn begin_commit(&mut self) -> Result<ChangeSet, ReviewError> {
        self.take()
    }

    pub fn pending(&self) -> Option<&ChangeSet> {
        match self {
            ReviewState::Empty => None,
            ReviewState::Proposed { changes, .. } => Some(changes),
        }
    }

    /// Content `path` had when it was submitted. `None` for added paths.
    pub fn original(&self, path: &str) -> Option<&str> {
        match self {
            ReviewState::Empty => None,
            ReviewState::Proposed { originals, .. } => originals.get(path).map(String::as_str),
        }
    }

    pub fn active(&self) -> Option<&str> {
        match self {
            ReviewState::Empty => None,
            ReviewState::Proposed { active, .. } => Some(active),
        }
    }

    fn take(&mut self) -> Result<ChangeSet, ReviewError> {
        match std::mem::take(self) {
            ReviewState::Empty => Err(ReviewError::NothingProposed),
            ReviewState::Proposed { changes, .. } => Ok(changes),
        }
    }
}
