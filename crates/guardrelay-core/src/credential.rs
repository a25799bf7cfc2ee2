//! Entity-id extraction from gateway credentials.
//!
//! Gateway keys have the form `vpsk_live_{24 hex}{remainder}`, optionally
//! sent as `Bearer vpsk_live_...`. The 24 hex digits are the entity id the
//! gateway uses to route and authorise a scan.

use std::fmt;

use crate::error::CredentialError;

const BEARER_PREFIX: &str = "Bearer ";
const KEY_PREFIX: &str = "vpsk_live_";
const ENTITY_ID_LEN: usize = 24;

/// A 24-character lowercase hexadecimal entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept an explicitly configured entity id (`ENTITY_ID`).
    ///
    /// Must already be exactly 24 hex digits.
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let raw = raw.trim();
        if raw.len() == ENTITY_ID_LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(raw.to_ascii_lowercase()))
        } else {
            Err(CredentialError::NotExtractable)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the entity id embedded in a gateway credential.
///
/// Pure and deterministic. Fails with `NotExtractable` unless the text,
/// after an optional leading `Bearer ` (case-sensitive, single space),
/// starts with `vpsk_live_` followed by 24 hex digits.
pub fn extract_entity_id(credential: &str) -> Result<EntityId, CredentialError> {
    let key = credential.strip_prefix(BEARER_PREFIX).unwrap_or(credential);
    let rest = key
        .strip_prefix(KEY_PREFIX)
        .ok_or(CredentialError::NotExtractable)?;
    // `get` returns None when 24 bytes would split a multi-byte char.
    let candidate = rest
        .get(..ENTITY_ID_LEN)
        .ok_or(CredentialError::NotExtractable)?;
    if !candidate.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CredentialError::NotExtractable);
    }
    Ok(EntityId(candidate.to_ascii_lowercase()))
}
