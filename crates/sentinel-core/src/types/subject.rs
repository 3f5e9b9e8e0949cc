//! Monitored subjects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a subject is, which decides how it is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// A user's portfolio; observed through its open positions.
    Portfolio,
    /// A machine; observed through resource samples.
    Host,
    /// A service; observed through its health endpoint.
    Service,
}

/// Something the engine monitors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub kind: SubjectKind,
}

impl Subject {
    pub fn portfolio(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SubjectKind::Portfolio,
        }
    }

    pub fn host(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SubjectKind::Host,
        }
    }

    pub fn service(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SubjectKind::Service,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SubjectKind::Portfolio => "portfolio",
            SubjectKind::Host => "host",
            SubjectKind::Service => "service",
        };
        write!(f, "{}:{}", kind, self.id)
    }
}
