//! `domain.object_id` identifiers as used by Home Assistant listeners

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("expected 'domain.object_id' with a single dot")]
    InvalidFormat,

    #[error("the part before the dot is empty")]
    EmptyDomain,

    #[error("the part after the dot is empty")]
    EmptyObjectId,

    #[error("uppercase letters are not allowed")]
    Uppercase,

    #[error("'-' is not allowed, write '_' instead")]
    ContainsDash,

    #[error("domain may only use a-z, 0-9 and single '_' between words")]
    InvalidDomainChars,

    #[error("object_id may only use a-z, 0-9 and '_', and not at either end")]
    InvalidObjectIdChars,
}

/// Validated entity id such as `person.alex`
///
/// Serializes as the plain string; deserializing runs the same checks as
/// [`FromStr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

fn allowed(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '_')
}

fn well_formed(part: &str) -> bool {
    !part.starts_with('_') && !part.ends_with('_') && part.chars().all(allowed)
}

impl EntityId {
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let (domain, object_id) = (domain.into(), object_id.into());

        // Dash and case are checked before the charset so they get a specific error.
        let both = || domain.chars().chain(object_id.chars());
        let problem = if domain.is_empty() {
            Some(EntityIdError::EmptyDomain)
        } else if object_id.is_empty() {
            Some(EntityIdError::EmptyObjectId)
        } else if both().any(|c| c == '-') {
            Some(EntityIdError::ContainsDash)
        } else if both().any(char::is_uppercase) {
            Some(EntityIdError::Uppercase)
        } else if domain.contains("__") || !well_formed(&domain) {
            Some(EntityIdError::InvalidDomainChars)
        } else if !well_formed(&object_id) {
            Some(EntityIdError::InvalidObjectIdChars)
        } else {
            None
        };

        match problem {
            Some(e) => Err(e),
            None => Ok(Self { domain, object_id }),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Repair the common mistakes (case, dashes, spaces) if that is enough
    pub fn normalized(raw: &str) -> Option<Self> {
        raw.trim()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_lowercase() })
            .collect::<String>()
            .parse()
            .ok()
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(domain), Some(object_id), None) => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
