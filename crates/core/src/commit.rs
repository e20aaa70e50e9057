//! Turning a reconciled working tree into a destination commit.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::{info, instrument, warn};

use crate::config::AuthorConfig;
use crate::errors::ReplayError;
use crate::git::{CommitRequest, DestinationVcs};
use crate::models::Changeset;

/// Formats carrying their own offset.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%.f %z"];

/// Formats without an offset; these are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a changeset date string into a timestamp, keeping its offset.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, ReplayError> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt);
    }
    if let Some(epoch) = s.strip_prefix('@') {
        // `@<seconds>` with an optional `±HHMM`, as `git commit --date` takes it.
        let with_offset = if epoch.contains(' ') {
            epoch.to_string()
        } else {
            format!("{} +0000", epoch)
        };
        if let Ok(dt) = DateTime::parse_from_str(&with_offset, "%s %z") {
            return Ok(dt);
        }
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }

    Err(ReplayError::InvalidTimestamp(raw.to_string()))
}

/// Stages the working tree and commits it under the fixed identity.
#[derive(Debug, Clone)]
pub struct CommitEmitter {
    name: String,
    email: String,
}

impl CommitEmitter {
    pub fn new(author: &AuthorConfig) -> Self {
        Self {
            name: author.name.clone(),
            email: author.email.clone(),
        }
    }

    /// Commit everything in the working tree for `changeset` with `message`.
    ///
    /// The commit is created even when nothing changed.
    #[instrument(skip(self, vcs, changeset, message), fields(changeset = changeset.id))]
    pub fn emit<D: DestinationVcs>(
        &self,
        vcs: &D,
        changeset: &Changeset,
        message: &str,
    ) -> Result<String, ReplayError> {
        let when = parse_timestamp(&changeset.timestamp).inspect_err(|_| {
            warn!(timestamp = %changeset.timestamp, "unparsable changeset timestamp");
        })?;

        let failed = |source| ReplayError::CommitFailed {
            changeset: changeset.id,
            source,
        };

        vcs.stage_all().map_err(failed)?;
        let sha = vcs
            .commit(&CommitRequest {
                author_name: self.name.clone(),
                author_email: self.email.clone(),
                when,
                message: message.to_string(),
            })
            .map_err(failed)?;

        info!(sha = %sha, "committed changeset");
        Ok(sha)
    }
}
