use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// ConsumerProfile is a receive quality tier the router may select for a
/// consumer. `Default` lets the router decide.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerProfile {
    #[default]
    Default,
    Low,
    Medium,
    High,
}

const CONSUMER_PROFILE_DEFAULT_STR: &str = "default";
const CONSUMER_PROFILE_LOW_STR: &str = "low";
const CONSUMER_PROFILE_MEDIUM_STR: &str = "medium";
const CONSUMER_PROFILE_HIGH_STR: &str = "high";

impl FromStr for ConsumerProfile {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            CONSUMER_PROFILE_DEFAULT_STR => Ok(ConsumerProfile::Default),
            CONSUMER_PROFILE_LOW_STR => Ok(ConsumerProfile::Low),
            CONSUMER_PROFILE_MEDIUM_STR => Ok(ConsumerProfile::Medium),
            CONSUMER_PROFILE_HIGH_STR => Ok(ConsumerProfile::High),
            _ => Err(Error::ErrInvalidProfile(raw.to_owned())),
        }
    }
}

impl fmt::Display for ConsumerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ConsumerProfile::Default => CONSUMER_PROFILE_DEFAULT_STR,
            ConsumerProfile::Low => CONSUMER_PROFILE_LOW_STR,
            ConsumerProfile::Medium => CONSUMER_PROFILE_MEDIUM_STR,
            ConsumerProfile::High => CONSUMER_PROFILE_HIGH_STR,
        };
        write!(f, "{s}")
    }
}
