//! Pull-request evidence types
//!
//! [`PrSignal`] is the raw, read-only evidence delivered by a code host.
//! [`HachikoPr`] is the normalized record produced once a signal has been
//! attributed to a migration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SignalError;

/// Raw pull-request evidence as delivered by a PR signal source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrSignal {
    /// Pull-request number
    pub number: u64,
    /// Title
    pub title: String,
    /// Body (empty when the code host reports none)
    #[serde(default)]
    pub body: String,
    /// Head branch name
    pub head_branch: String,
    /// Label names
    #[serde(default)]
    pub labels: Vec<String>,
    /// Web URL
    #[serde(default)]
    pub url: String,
    /// Whether the PR was merged
    #[serde(default)]
    pub merged: bool,
    /// Whether the PR is closed (merged PRs are closed too)
    #[serde(default)]
    pub closed: bool,
}

impl PrSignal {
    /// Create an open PR signal with an empty body and no labels
    #[inline]
    #[must_use]
    pub fn new(number: u64, title: impl Into<String>, head_branch: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            body: String::new(),
            head_branch: head_branch.into(),
            labels: Vec::new(),
            url: String::new(),
            merged: false,
            closed: false,
        }
    }

    /// With body text
    #[inline]
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// With an additional label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// With URL
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Mark closed and merged
    #[inline]
    #[must_use]
    pub fn merged(mut self) -> Self {
        self.closed = true;
        self.merged = true;
        self
    }

    /// Mark closed without merge
    #[inline]
    #[must_use]
    pub fn closed_unmerged(mut self) -> Self {
        self.closed = true;
        self.merged = false;
        self
    }

    /// Lifecycle classification
    #[inline]
    #[must_use]
    pub fn state(&self) -> PrState {
        if self.merged {
            PrState::Merged
        } else if self.closed {
            PrState::Closed
        } else {
            PrState::Open
        }
    }

    /// Check whether the PR carries a label (exact match)
    #[inline]
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Pull-request lifecycle classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    /// Open
    Open,
    /// Closed without merge
    Closed,
    /// Merged
    Merged,
}

impl PrState {
    /// Closed or merged
    #[inline]
    #[must_use]
    pub fn is_closed(self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Step reference carried by a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "number")]
pub enum StepRef {
    /// Numbered step (1-based)
    Number(u32),
    /// Final cleanup step
    Cleanup,
    /// No step could be determined
    Unspecified,
}

impl StepRef {
    /// Numeric step, if any
    #[inline]
    #[must_use]
    pub fn number(self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Parse a raw step fragment; non-numeric, zero or unknown values yield `Unspecified`
    #[must_use]
    pub fn from_fragment(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("cleanup") {
            return Self::Cleanup;
        }
        match raw.parse::<u32>() {
            Ok(n) if n >= 1 => Self::Number(n),
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Cleanup => write!(f, "cleanup"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

impl FromStr for StepRef {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_fragment(s) {
            Self::Unspecified => Err(SignalError::InvalidStep(s.to_string())),
            step => Ok(step),
        }
    }
}

/// Normalized record for a pull request attributed to a migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HachikoPr {
    /// Pull-request number
    pub number: u64,
    /// Title
    pub title: String,
    /// Web URL
    pub url: String,
    /// Head branch
    pub branch: String,
    /// Labels
    pub labels: Vec<String>,
    /// Owning migration
    pub migration_id: String,
    /// Step carried by the PR
    pub step: StepRef,
    /// Lifecycle classification
    pub state: PrState,
}

impl HachikoPr {
    /// Open PR
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == PrState::Open
    }

    /// Merged PR
    #[inline]
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.state == PrState::Merged
    }
}
