// src/storage/access_log_store.rs
//! Append-only access log with a filtered, paginated query.

use crate::models::access_log::AccessLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Query filter. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct AccessLogFilter {
    pub user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AccessLogFilter {
    fn matches(&self, log: &AccessLog) -> bool {
        self.user_id.map_or(true, |id| log.user_id == Some(id))
            && self
                .resource_type
                .as_ref()
                .map_or(true, |t| &log.resource_type == t)
            && self.start.map_or(true, |start| log.timestamp >= start)
            && self.end.map_or(true, |end| log.timestamp <= end)
    }
}

/// One page of results plus the total number of matching records.
#[derive(Debug, Clone)]
pub struct AccessLogPage {
    pub logs: Vec<AccessLog>,
    pub total: usize,
}

#[async_trait]
pub trait AccessLogStore: Send + Sync {
    async fn append(&self, log: AccessLog);

    /// Newest first. `page` is 1-based.
    async fn query(&self, filter: &AccessLogFilter, page: usize, limit: usize) -> AccessLogPage;
}

#[derive(Default)]
pub struct InMemoryAccessLogStore {
    logs: RwLock<Vec<AccessLog>>,
}

impl InMemoryAccessLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessLogStore for InMemoryAccessLogStore {
    async fn append(&self, log: AccessLog) {
        self.logs.write().await.push(log);
    }

    async fn query(&self, filter: &AccessLogFilter, page: usize, limit: usize) -> AccessLogPage {
        let logs = self.logs.read().await;
        let mut matching: Vec<&AccessLog> = logs.iter().filter(|l| filter.matches(l)).collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = matching.len();
        let skip = page.saturating_sub(1).saturating_mul(limit);
        AccessLogPage {
            logs: matching.into_iter().skip(skip).take(limit).cloned().collect(),
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::access_log::AccessedBy;
    use chrono::Duration;

    fn log(user_id: Option<Uuid>, resource_type: &str, minutes_ago: i64) -> AccessLog {
        AccessLog {
            id: Uuid::new_v4(),
            user_id,
            resource_type: resource_type.into(),
            resource_id: "res-1".into(),
            action: "view".into(),
            accessed_by: AccessedBy::User,
            ip_address: None,
            user_agent: None,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_query_filters_and_paginates_newest_first() {
        let store = InMemoryAccessLogStore::new();
        let user = Uuid::new_v4();
        for minutes in [30, 10, 20] {
            store.append(log(Some(user), "document", minutes)).await;
        }
        store.append(log(None, "share", 5)).await;

        let filter = AccessLogFilter {
            user_id: Some(user),
            resource_type: Some("document".into()),
            ..Default::default()
        };
        let first = store.query(&filter, 1, 2).await;
        assert_eq!(first.total, 3);
        assert_eq!(first.logs.len(), 2);
        assert!(first.logs[0].timestamp > first.logs[1].timestamp);

        let second = store.query(&filter, 2, 2).await;
        assert_eq!(second.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_query_date_window() {
        let store = InMemoryAccessLogStore::new();
        store.append(log(None, "document", 120)).await;
        store.append(log(None, "document", 1)).await;

        let filter = AccessLogFilter {
            start: Some(Utc::now() - Duration::minutes(60)),
            ..Default::default()
        };
        assert_eq!(store.query(&filter, 1, 20).await.total, 1);
    }
}
