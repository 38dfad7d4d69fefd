use std::fmt;

use serde::{Deserialize, Serialize};

/// Originator tells whether a lifecycle change was requested by the local
/// application or by the remote router.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Originator {
    Local,
    Remote,
}

impl fmt::Display for Originator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Originator::Local => write!(f, "local"),
            Originator::Remote => write!(f, "remote"),
        }
    }
}
