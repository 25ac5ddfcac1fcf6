//! Strongly-typed identifiers used across the engine.
//!
//! Downstream crates (storage, operators, exec) should *not* pass raw integers
//! around for element or cube ids.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! new_id {
    ($name:ident, $repr:ty) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            pub const fn new(v: $repr) -> Self {
                Self(v)
            }
            pub const fn get(self) -> $repr {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

// Dimension-scoped element id. Ordering follows the numeric value.
new_id!(Identifier, u32);
new_id!(CubeId, u64);

impl From<u32> for Identifier {
    fn from(v: u32) -> Self {
        Identifier::new(v)
    }
}
