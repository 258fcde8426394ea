// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newtype macros for identifiers and names

/// Define a newtype wrapper around `String` for an identifier or name.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`,
/// `From<&str>`, `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>`
/// implementations.
///
/// ```ignore
/// define_string_type! {
///     /// Doc comment for the type.
///     pub struct MyName;
/// }
/// ```
#[macro_export]
macro_rules! define_string_type {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Define a newtype ID with a fixed kind prefix.
///
/// Extends [`define_string_type!`] with `generate()` (uniformly random,
/// `<kind>-<32 hex>`) and `is_well_formed()` validation.
#[macro_export]
macro_rules! define_prefixed_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident, $prefix:literal;
    ) => {
        $crate::define_string_type! {
            $(#[$meta])*
            pub struct $name;
        }

        impl $name {
            /// The kind prefix, without the trailing dash.
            pub const PREFIX: &'static str = $prefix;

            /// Generate a fresh globally-unique id: `<kind>-<32 hex>`.
            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, uuid::Uuid::new_v4().simple()))
            }

            /// Whether this id has the expected `<kind>-<32 hex>` shape.
            pub fn is_well_formed(&self) -> bool {
                match self.0.strip_prefix(concat!($prefix, "-")) {
                    Some(hex) => {
                        hex.len() == 32 && hex.bytes().all(|b| b.is_ascii_hexdigit())
                    }
                    None => false,
                }
            }
        }
    };
}
