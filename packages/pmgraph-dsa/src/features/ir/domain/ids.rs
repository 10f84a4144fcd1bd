//! Stable identifiers
//!
//! Functions, globals, locals and call instructions are referred to by dense
//! `u32` ids instead of pointers. Every map in the analysis is keyed by these.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                Self(v)
            }
        }
    };
}

define_id!(
    /// Index of a function in its module
    FunctionId,
    "fn#"
);

define_id!(
    /// Index of a global variable in its module
    GlobalId,
    "gv#"
);

define_id!(
    /// Function-local SSA value
    LocalId,
    "%"
);

define_id!(
    /// Call instruction, unique across the whole module
    CallInstId,
    "call#"
);
