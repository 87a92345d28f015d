// src/models/access_log.rs
//! Audit record of who accessed which resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of the party that accessed a resource.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AccessedBy {
    #[default]
    User,
    Admin,
    ThirdParty,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    pub id: Uuid,
    /// Absent for anonymous access, e.g. through a share link
    pub user_id: Option<Uuid>,
    /// document, identity, share...
    pub resource_type: String,
    pub resource_id: String,
    /// view, download, verify...
    pub action: String,
    pub accessed_by: AccessedBy,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessed_by_wire_names() {
        assert_eq!(serde_json::to_string(&AccessedBy::ThirdParty).unwrap(), "\"third-party\"");
        let parsed: AccessedBy = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(parsed, AccessedBy::Admin);
    }
}
