use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::index_vec::Idx;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }

        impl Idx for $name {
            fn index(self) -> usize {
                self.0 as usize
            }

            fn from_usize(idx: usize) -> Self {
                Self(idx as u32)
            }
        }
    };
}

define_id!(PlaceId, "p");
define_id!(TransitionId, "t");
define_id!(ArcId, "a");

/// 令牌标识。由运行上下文中的 [`TokenCounter`] 单调分配，仅在一次运行内唯一。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.0)
    }
}

/// Run-scoped, monotonically increasing token id source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenCounter {
    next: u64,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> TokenId {
        let id = TokenId(self.next);
        self.next += 1;
        id
    }

    pub fn issued(&self) -> u64 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_monotonic_and_starts_at_zero() {
        let mut counter = TokenCounter::new();
        assert_eq!(counter.issue(), TokenId(0));
        assert_eq!(counter.issue(), TokenId(1));
        assert_eq!(counter.issued(), 2);
        assert_eq!(TokenCounter::new().issue(), TokenId(0));
    }

    #[test]
    fn ids_debug_with_prefix() {
        assert_eq!(format!("{:?}", PlaceId::new(3)), "p3");
        assert_eq!(format!("{}", TransitionId::new(7)), "t7");
    }
}
