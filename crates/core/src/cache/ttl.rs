//! Cache lifetime setting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long cache entries are kept.
///
/// Serialized as a plain integer: `0` disabled, `-1` forever,
/// any positive value is a number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum CacheTtl {
    Disabled,
    Forever,
    Seconds(u64),
}

impl CacheTtl {
    pub const DISABLED: i64 = 0;
    pub const FOREVER: i64 = -1;

    pub fn is_disabled(self) -> bool {
        matches!(self, CacheTtl::Disabled)
    }

    /// Maximum entry age, or `None` when entries never expire by age.
    pub fn max_age(self) -> Option<Duration> {
        match self {
            CacheTtl::Seconds(s) => Some(Duration::from_secs(s)),
            CacheTtl::Disabled | CacheTtl::Forever => None,
        }
    }
}

impl TryFrom<i64> for CacheTtl {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            Self::DISABLED => Ok(CacheTtl::Disabled),
            Self::FOREVER => Ok(CacheTtl::Forever),
            v if v > 0 => Ok(CacheTtl::Seconds(v as u64)),
            v => Err(format!("invalid cache ttl {v}: use 0, -1 or a positive number of seconds")),
        }
    }
}

impl From<CacheTtl> for i64 {
    fn from(ttl: CacheTtl) -> Self {
        match ttl {
            CacheTtl::Disabled => CacheTtl::DISABLED,
            CacheTtl::Forever => CacheTtl::FOREVER,
            CacheTtl::Seconds(s) => s as i64,
        }
    }
}
