//! Numeric identifiers used across the domain.
//!
//! Records are keyed by monotonically allocated integers. Each domain crate
//! declares its own typed id with [`numeric_id!`](crate::numeric_id) and
//! allocates values from an [`IdSequence`].

use serde::{Deserialize, Serialize};

/// Declare a `Copy` newtype id over an integer.
///
/// The generated type is ordered, hashable, serde-transparent, displays as the
/// bare integer and parses from a string (failures map to
/// [`DomainError::InvalidId`](crate::DomainError::InvalidId)).
#[macro_export]
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident($inner:ty), $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn new(value: $inner) -> Self {
                Self(value)
            }

            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl core::str::FromStr for $name {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<$inner>()
                    .map(Self)
                    .map_err(|e| $crate::DomainError::invalid_id(format!("{}: {}", $label, e)))
            }
        }
    };
}

/// Monotonic id allocator (ids start at 1 and are never reused).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdSequence {
    last: u64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Last allocated id (0 when nothing was allocated).
    pub fn last(&self) -> u64 {
        self.last
    }
}
