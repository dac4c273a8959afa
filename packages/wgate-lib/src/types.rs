use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum transmission unit of a tunnel link or peer.
///
/// Zero means "not set" and is what a merge treats as an absent value.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd,
)]
#[serde(transparent)]
pub struct Mtu(u16);

impl Mtu {
    pub const MIN: u16 = 1280;
    pub const MAX: u16 = 1500;

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u16 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        (Self::MIN..=Self::MAX).contains(&self.0)
    }

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Mtu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Mtu {
    fn from(v: u16) -> Self {
        Self(v)
    }
}
