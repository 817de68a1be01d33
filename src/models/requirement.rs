use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A kind of action a client must complete before it is permitted.
///
/// Known kinds have their own variant; anything else is carried as
/// `Custom` so new kinds can be stored and rendered without touching the
/// state engine. The derived ordering puts known kinds first, in
/// registration order, then custom kinds by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequirementKind {
    /// Accept the terms and conditions page.
    ViewPage,
    /// Log in on the credentials page.
    ProvideCredentials,
    /// Any kind without a dedicated variant.
    Custom(String),
}

impl RequirementKind {
    /// Kinds with a dedicated variant.
    pub const KNOWN: [RequirementKind; 2] =
        [RequirementKind::ViewPage, RequirementKind::ProvideCredentials];

    /// The wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            RequirementKind::ViewPage => "view_page",
            RequirementKind::ProvideCredentials => "provide_credentials",
            RequirementKind::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, RequirementKind::Custom(_))
    }
}

impl FromStr for RequirementKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::KNOWN
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .unwrap_or_else(|| RequirementKind::Custom(s.to_string())))
    }
}

impl From<&str> for RequirementKind {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RequirementKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RequirementKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RequirementKind::from(raw.as_str()))
    }
}

/// An outstanding condition on a session. The record exists only while the
/// condition is unmet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// The session this requirement belongs to.
    pub session_id: Uuid,
    /// What the client has to do.
    pub kind: RequirementKind,
    /// Where the client does it.
    pub url: String,
}
