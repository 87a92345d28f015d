// src/services/access_logs.rs
//! Access audit trail: recording events and the admin query.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::access_log::{AccessLog, AccessedBy};
use crate::storage::access_log_store::{AccessLogFilter, AccessLogStore};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAccessRequest {
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    #[serde(default)]
    pub accessed_by: AccessedBy,
}

/// Client details taken from the request headers.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Reads the first `X-Forwarded-For` hop and the `User-Agent` header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        ClientInfo {
            ip_address: header("x-forwarded-for")
                .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string())),
            user_agent: header("user-agent"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogQuery {
    pub user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogResults {
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
    pub logs: Vec<AccessLog>,
}

pub struct AccessLogService {
    logs: Arc<dyn AccessLogStore>,
}

impl AccessLogService {
    pub fn new(logs: Arc<dyn AccessLogStore>) -> Self {
        AccessLogService { logs }
    }

    pub async fn record(
        &self,
        user_id: Option<Uuid>,
        request: LogAccessRequest,
        client: ClientInfo,
    ) -> Result<AccessLog, ApiError> {
        if request.resource_type.trim().is_empty()
            || request.resource_id.trim().is_empty()
            || request.action.trim().is_empty()
        {
            return Err(ApiError::bad_request(
                "resourceType, resourceId and action are required",
            ));
        }

        let log = AccessLog {
            id: Uuid::new_v4(),
            user_id,
            resource_type: request.resource_type,
            resource_id: request.resource_id,
            action: request.action,
            accessed_by: request.accessed_by,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
            timestamp: Utc::now(),
        };
        debug!(
            "Access {} {}/{} by {:?}",
            log.action, log.resource_type, log.resource_id, log.user_id
        );
        self.logs.append(log.clone()).await;
        Ok(log)
    }

    /// Newest-first page of matching records. `page` is clamped to at least 1
    /// and `limit` to 1..=100.
    pub async fn query(&self, query: AccessLogQuery) -> Result<AccessLogResults, ApiError> {
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                return Err(ApiError::bad_request("startDate must not be after endDate"));
            }
        }

        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let filter = AccessLogFilter {
            user_id: query.user_id,
            resource_type: query.resource_type.filter(|t| !t.is_empty()),
            start: query.start_date,
            end: query.end_date,
        };

        let result = self.logs.query(&filter, page, limit).await;
        Ok(AccessLogResults {
            total: result.total,
            page,
            limit,
            total_pages: result.total.div_ceil(limit),
            logs: result.logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::access_log_store::InMemoryAccessLogStore;
    use axum::http::HeaderValue;

    fn service() -> AccessLogService {
        AccessLogService::new(Arc::new(InMemoryAccessLogStore::new()))
    }

    fn request(resource_type: &str) -> LogAccessRequest {
        LogAccessRequest {
            resource_type: resource_type.into(),
            resource_id: "doc-1".into(),
            action: "view".into(),
            accessed_by: AccessedBy::ThirdParty,
        }
    }

    #[test]
    fn test_client_info_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));

        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.0"));
        assert!(ClientInfo::from_headers(&HeaderMap::new()).ip_address.is_none());
    }

    #[tokio::test]
    async fn test_record_requires_fields() {
        let service = service();
        let mut missing = request("document");
        missing.action = " ".into();
        assert!(matches!(
            service.record(None, missing, ClientInfo::default()).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_query_paginates_with_limits() {
        let service = service();
        let user = Uuid::new_v4();
        for _ in 0..5 {
            service
                .record(Some(user), request("document"), ClientInfo::default())
                .await
                .unwrap();
        }
        service
            .record(None, request("share"), ClientInfo::default())
            .await
            .unwrap();

        let page = service
            .query(AccessLogQuery {
                user_id: Some(user),
                page: Some(2),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.logs.len(), 2);

        let capped = service
            .query(AccessLogQuery {
                limit: Some(1_000),
                page: Some(0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(capped.limit, MAX_PAGE_SIZE);
        assert_eq!(capped.page, 1);
        assert_eq!(capped.total, 6);
    }

    #[tokio::test]
    async fn test_query_rejects_inverted_window() {
        let service = service();
        let now = Utc::now();
        let result = service
            .query(AccessLogQuery {
                start_date: Some(now),
                end_date: Some(now - chrono::Duration::hours(1)),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
