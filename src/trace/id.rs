// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Correlation identifiers for transports and request attempts.
//!
//! A [`CoreId`] is minted once per transport. The transport's own
//! [`TransportId`] and every [`RequestId`] it mints are the core ID plus a
//! random hex suffix, so all records from one logical request chain can be
//! grouped by prefix.

use std::fmt;

use crate::error::TraceError;

const CORE_ID_BYTES: usize = 10;
const SUFFIX_BYTES: usize = 6;

fn random_bytes<const N: usize>() -> Result<[u8; N], TraceError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(|e| TraceError::Entropy(e.to_string()))?;
    Ok(buf)
}

fn derive(core: &CoreId) -> Result<String, TraceError> {
    let suffix = random_bytes::<SUFFIX_BYTES>()?;
    Ok(format!("{}-{}", core.0, hex::encode(suffix)))
}

/// Identifier shared by a transport and every attempt made through it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CoreId(String);

impl CoreId {
    /// Generate a new core ID from 10 bytes of system entropy.
    ///
    /// Formatted as `xxxxxxxx-xxxx-xxxx-xxxx`.
    pub fn try_generate() -> Result<Self, TraceError> {
        let b = random_bytes::<CORE_ID_BYTES>()?;
        Ok(Self(format!(
            "{}-{}-{}-{}",
            hex::encode(&b[0..4]),
            hex::encode(&b[4..6]),
            hex::encode(&b[6..8]),
            hex::encode(&b[8..10]),
        )))
    }

    /// Generate a new core ID.
    ///
    /// # Panics
    ///
    /// Panics if the system entropy source is unavailable. Nothing downstream
    /// can proceed without unique identifiers.
    pub fn generate() -> Self {
        Self::try_generate().unwrap_or_else(|e| panic!("cannot mint core ID: {e}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of one constructed transport (one "session").
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TransportId(String);

impl TransportId {
    /// Derive a transport ID from a core ID.
    ///
    /// # Panics
    ///
    /// Panics if the system entropy source is unavailable.
    pub fn derive(core: &CoreId) -> Self {
        Self(derive(core).unwrap_or_else(|e| panic!("cannot mint transport ID: {e}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of one dispatch attempt.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Derive a fresh request ID from a core ID.
    ///
    /// # Panics
    ///
    /// Panics if the system entropy source is unavailable.
    pub fn derive(core: &CoreId) -> Self {
        Self(derive(core).unwrap_or_else(|e| panic!("cannot mint request ID: {e}")))
    }

    /// Whether this attempt belongs to the chain identified by `core`.
    pub fn belongs_to(&self, core: &CoreId) -> bool {
        self.0
            .strip_prefix(core.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_id_traits {
    ($($ty:ident),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($ty), "({})"), self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }
    )*};
}

impl_id_traits!(CoreId, TransportId, RequestId);
