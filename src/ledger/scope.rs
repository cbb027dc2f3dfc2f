//! Scope taxonomy and daily counter addressing.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};

/// Level at which spend is tracked and capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    User,
    Project,
    Global,
}

impl ScopeKind {
    /// Key segment for this kind (`user`, `project`, `global`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::User => "user",
            ScopeKind::Project => "project",
            ScopeKind::Global => "global",
        }
    }

    /// Capitalized label used in denial messages and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ScopeKind::User => "User",
            ScopeKind::Project => "Project",
            ScopeKind::Global => "Global",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One spend-tracking scope: a kind plus its identifier.
///
/// Global carries no identifier; User and Project always do. The
/// constructors enforce that pairing, so every `Scope` is valid by
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    kind: ScopeKind,
    id: Option<String>,
}

impl Scope {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::User,
            id: Some(id.into()),
        }
    }

    pub fn project(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Project,
            id: Some(id.into()),
        }
    }

    pub fn global() -> Self {
        Self {
            kind: ScopeKind::Global,
            id: None,
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl fmt::Display for Scope {
    /// `User u1`, `Project p7`, `Global`: the form denial messages use.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} {}", self.kind.label(), id),
            None => f.write_str(self.kind.label()),
        }
    }
}

/// Fully-qualified address of one daily counter: a scope plus its UTC-day
/// bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    scope: Scope,
    day: NaiveDate,
}

impl ScopeKey {
    pub fn new(scope: Scope, day: NaiveDate) -> Self {
        Self { scope, day }
    }

    /// Key for `scope` in the current UTC day's bucket.
    pub fn today(scope: Scope) -> Self {
        Self::new(scope, utc_day(Utc::now()))
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Storage key under `namespace`:
    /// `{ns}:global:{day}`, `{ns}:user:{id}:{day}`, `{ns}:project:{id}:{day}`.
    pub fn storage_key(&self, namespace: &str) -> String {
        let day = self.day.format("%Y-%m-%d");
        match self.scope.id() {
            Some(id) => format!("{}:{}:{}:{}", namespace, self.scope.kind(), id, day),
            None => format!("{}:{}:{}", namespace, self.scope.kind(), day),
        }
    }
}

/// UTC calendar day for `now`. The bucket is always stamped server-side;
/// request-supplied timestamps never pick the window.
pub(crate) fn utc_day(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

/// Time remaining until the next UTC midnight, when every daily counter
/// rotates to a fresh key.
///
/// `86_400 - floor(seconds elapsed today)` is never zero, so a counter
/// touched just before midnight still outlives the bucket switch.
pub(crate) fn ttl_until_next_utc_midnight(now: DateTime<Utc>) -> Duration {
    let elapsed = u64::from(now.time().num_seconds_from_midnight());
    Duration::from_secs(86_400 - elapsed)
}
