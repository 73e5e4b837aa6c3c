//! Publication lifecycle of news items.
//!
//! ```text
//!            publish
//!   draft ------------> published
//!     ^                     |
//!     +---- save as draft --+
//! ```
//!
//! Either state can be deleted. A transition is committed by a single backend
//! update carrying the new status and `updated_at`, so viewers see the old row
//! or the new row and nothing in between.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{NewsPatch, NewsStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Publish,
    SaveAsDraft,
}

impl LifecycleAction {
    pub fn target(&self) -> NewsStatus {
        match self {
            LifecycleAction::Publish => NewsStatus::Published,
            LifecycleAction::SaveAsDraft => NewsStatus::Draft,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("News item is already {0}")]
    InvalidTransition(NewsStatus),
}

impl NewsStatus {
    pub fn transition(self, action: LifecycleAction) -> Result<NewsStatus, LifecycleError> {
        match (self, action) {
            (NewsStatus::Draft, LifecycleAction::Publish) => Ok(NewsStatus::Published),
            (NewsStatus::Published, LifecycleAction::SaveAsDraft) => Ok(NewsStatus::Draft),
            (current, _) => Err(LifecycleError::InvalidTransition(current)),
        }
    }
}

/// The single patch that commits `action` on an item currently in `current`.
pub fn transition_patch(
    current: NewsStatus,
    action: LifecycleAction,
    now: NaiveDateTime,
) -> Result<NewsPatch, LifecycleError> {
    let next = current.transition(action)?;
    Ok(NewsPatch::touch(now).with_status(next))
}
