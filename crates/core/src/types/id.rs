//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types.
//!
//! The class server is inconsistent about ID encoding: the login response
//! carries `"id": "1"` while class records carry `"creator_id": 1`. IDs
//! therefore deserialize from either a JSON number or a numeric string, and
//! always serialize as a number.

use serde::de::{Deserializer, Error as _};
use serde::Deserialize;

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i64` with:
/// - `Serialize` as a plain number, lenient `Deserialize` (number or numeric string)
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`
/// - Conversion methods: `new()`, `as_i64()`
/// - `From<i64>`, `Into<i64>`, `Display` and `FromStr` implementations
///
/// # Example
///
/// ```rust
/// # use classbook_core::define_id;
/// define_id!(StudentId);
/// define_id!(RoomId);
///
/// let student_id = StudentId::new(1);
/// let room_id = RoomId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: StudentId = room_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ::serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new ID from an i64 value.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying i64 value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::core::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                $crate::types::id::deserialize_lenient_id(deserializer).map(Self)
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(UserId);
define_id!(ClassId);

/// Deserialize an ID encoded either as a JSON integer or a numeric string.
///
/// Used by [`define_id!`]; not intended to be called directly.
///
/// # Errors
///
/// Returns an error if the value is neither an integer nor a string holding one.
#[doc(hidden)]
pub fn deserialize_lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid id: {text:?}"))),
    }
}
