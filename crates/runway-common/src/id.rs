//! Composite run identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ParseError;

/// Identity of a run: `(organization, project, run_uuid)`.
///
/// The canonical text form is `organization/project/run_uuid`, which is also how
/// the id is serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId {
    organization: String,
    project: String,
    uuid: Uuid,
}

impl RunId {
    /// Build a run id from its parts, validating the organization and project slugs.
    pub fn new(organization: &str, project: &str, uuid: Uuid) -> Result<Self, ParseError> {
        for (label, value) in [("organization", organization), ("project", project)] {
            if !is_slug(value) {
                return Err(ParseError::RunId {
                    value: format!("{}/{}/{}", organization, project, uuid),
                    reason: format!(
                        "{} '{}' must start with a letter or digit and contain only letters, digits, '.', '_' or '-'",
                        label, value
                    ),
                });
            }
        }
        Ok(Self {
            organization: organization.to_string(),
            project: project.to_string(),
            uuid,
        })
    }

    /// Generate a fresh run id for the given organization and project.
    pub fn generate(organization: &str, project: &str) -> Result<Self, ParseError> {
        Self::new(organization, project, Uuid::new_v4())
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// First eight characters of the uuid, for compact display.
    pub fn short(&self) -> String {
        self.uuid.simple().to_string()[..8].to_string()
    }
}

fn is_slug(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.project, self.uuid)
    }
}

impl FromStr for RunId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.len() != 3 {
            return Err(ParseError::RunId {
                value: s.to_string(),
                reason: "expected organization/project/run_uuid".to_string(),
            });
        }
        let uuid = Uuid::parse_str(parts[2]).map_err(|e| ParseError::RunId {
            value: s.to_string(),
            reason: format!("run_uuid is not a valid UUID: {}", e),
        })?;
        Self::new(parts[0], parts[1], uuid)
    }
}

impl TryFrom<String> for RunId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_display_and_parse() {
        let id = RunId::generate("acme", "billing").unwrap();
        let text = id.to_string();
        assert!(text.starts_with("acme/billing/"));
        let parsed: RunId = text.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_run_id_rejects_wrong_shape() {
        assert!("acme/billing".parse::<RunId>().is_err());
        assert!("acme/billing/not-a-uuid".parse::<RunId>().is_err());
        assert!("".parse::<RunId>().is_err());
    }

    #[test]
    fn test_run_id_rejects_path_like_slugs() {
        let uuid = Uuid::new_v4();
        assert!(RunId::new("..", "billing", uuid).is_err());
        assert!(RunId::new("acme", "", uuid).is_err());
        assert!(RunId::new("acme", "bill ing", uuid).is_err());
        assert!(RunId::new("acme-corp", "billing_v2.1", uuid).is_ok());
    }

    #[test]
    fn test_run_id_serializes_as_string() {
        let id = RunId::generate("acme", "billing").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_short_is_eight_chars() {
        let id = RunId::generate("acme", "billing").unwrap();
        assert_eq!(id.short().len(), 8);
    }
}
