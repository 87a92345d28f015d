// src/models/share.rs
//! Verification share: a time-limited, credential-free link to a redacted
//! verification summary of some of a user's documents.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerificationShare {
    /// Random hex code, unique across shares
    pub code: String,
    pub user_id: Uuid,
    pub document_ids: Vec<Uuid>,
    pub expires_at: DateTime<Utc>,
    /// Expose content hashes and reviewer details
    pub include_details: bool,
    /// Expose preview URLs for the documents
    pub show_documents: bool,
    pub created_at: DateTime<Utc>,
}

impl VerificationShare {
    /// A share stays readable up to and including `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
