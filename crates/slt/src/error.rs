//! Error taxonomy for the source-location-tracking core.
//!
//! Mirrors the kinds (not type names) from the design's error handling
//! section: inversion failures are caller responsibility, invalid ids are
//! logged and dropped or answered with `valid=false`, schema/parse errors
//! are fatal and surfaced, transport failures propagate verbatim.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SltError>;

/// Errors that can occur while building, reversing, or transporting an
/// expression history.
#[derive(Debug, Clone, PartialEq)]
pub enum SltError {
    /// Reverse-apply hit a division by zero, or otherwise tried to invert an
    /// information-destroying operation (e.g. multiplication by zero).
    InversionImpossible,
    /// A header or string form failed to parse (empty locations list,
    /// dangling or non-forest graph edges, unrecognized token, ...).
    Schema(String),
    /// A pending `GetValue` did not receive a response within the deadline.
    Unreachable,
    /// The transport was disconnected while an operation was pending.
    TransportClosed,
    /// The underlying structured payload rejected an assignment (e.g. a
    /// native scalar field with a type assertion). `Tracked` absorbs this
    /// case internally and falls back to storing the raw scalar plus an
    /// independent `Location`; the variant exists so the taxonomy is
    /// complete and so tests can assert on the fallback path.
    TypeAssertionRejected,
}

impl fmt::Display for SltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InversionImpossible => write!(f, "expression history cannot be inverted for this value"),
            Self::Schema(msg) => write!(f, "schema error: {msg}"),
            Self::Unreachable => write!(f, "request did not receive a response before the deadline"),
            Self::TransportClosed => write!(f, "transport disconnected while an operation was pending"),
            Self::TypeAssertionRejected => write!(f, "underlying payload rejected assignment"),
        }
    }
}

impl std::error::Error for SltError {}
