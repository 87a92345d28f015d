// src/services/api_server.rs
//! API Server for the KYC document verification service
//!
//! All routes live under `/api` and answer with JSON bodies of the form
//! `{ "success": true, ... }` or, through [`ApiError`], `{ "success": false,
//! "message": ... }`. The server owns one instance of every service and shares
//! itself with handlers as `Arc<ApiServer>` state.
//!
//! Endpoints cover:
//! - account registration, login and profile
//! - blockchain identity creation, admin verification and revocation
//! - document upload, submission, single-admin review and downloads
//! - multi-signature enablement, admin signatures and status
//! - public share links and the public IPFS content proxy
//! - the access audit log

use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use ethers::utils::ConversionError;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::blockchain::DocumentLedger;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::access_log::AccessedBy;
use crate::services::access_logs::{AccessLogQuery, AccessLogService, ClientInfo, LogAccessRequest};
use crate::services::accounts::{AccountService, LoginRequest, RegisterRequest};
use crate::services::auth::{AdminUser, AuthService, AuthUser};
use crate::services::document_service::{DocumentContent, DocumentService, ReviewAction, UploadedFile};
use crate::services::identity_service::IdentityService;
use crate::services::multisig::{EnableMultiSigRequest, MultiSigService, SignRequest};
use crate::services::share_service::{CreateShareRequest, ShareService};
use crate::storage::ipfs_client::ContentStore;
use crate::storage::user_store::{ProfileUpdate, UserStore};
use crate::storage::Stores;
use crate::utils::crypto::sanitize_filename;

/// Largest accepted request body, which bounds uploaded documents.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    #[serde(default)]
    document_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
struct ReviewRequest {
    action: ReviewAction,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyIdentityRequest {
    user_id: Uuid,
}

#[derive(Deserialize)]
struct ShareQuery {
    code: Option<String>,
}

/// Shared state of every handler.
#[derive(Clone)]
pub struct ApiServer {
    pub(crate) auth: Arc<AuthService>,
    pub(crate) users: Arc<dyn UserStore>,
    accounts: Arc<AccountService>,
    identities: Arc<IdentityService>,
    documents: Arc<DocumentService>,
    multisig: Arc<MultiSigService>,
    shares: Arc<ShareService>,
    access_logs: Arc<AccessLogService>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `config` - Application configuration
    /// * `stores` - Record stores
    /// * `content` - Content adapter documents are pinned to
    /// * `ledger` - Chain adapter; `None` runs without on-chain anchoring
    ///
    /// # Errors
    /// Returns `ConversionError` if the configured multisig fee or gas estimate
    /// is not a valid ether amount.
    pub fn new(
        config: AppConfig,
        stores: Stores,
        content: Arc<dyn ContentStore>,
        ledger: Option<Arc<dyn DocumentLedger>>,
    ) -> Result<Self, ConversionError> {
        let config = Arc::new(config);
        let auth = Arc::new(AuthService::new(&config.jwt_secret, config.jwt_expiry_hours));

        let multisig = MultiSigService::new(
            stores.documents.clone(),
            stores.users.clone(),
            ledger.clone(),
            &config,
        )?;

        Ok(ApiServer {
            accounts: Arc::new(AccountService::new(
                stores.users.clone(),
                auth.clone(),
                config.clone(),
            )),
            identities: Arc::new(IdentityService::new(stores.users.clone())),
            documents: Arc::new(DocumentService::new(
                stores.documents.clone(),
                stores.users.clone(),
                content,
                ledger,
            )),
            multisig: Arc::new(multisig),
            shares: Arc::new(ShareService::new(
                stores.shares,
                stores.documents,
                stores.users.clone(),
                &config,
            )),
            access_logs: Arc::new(AccessLogService::new(stores.access_logs)),
            users: stores.users,
            auth,
        })
    }

    /// Builds the router with every API route.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/health", get(Self::health_handler))
            // Accounts
            .route("/api/users/register", post(Self::register_handler))
            .route("/api/users/login", post(Self::login_handler))
            .route(
                "/api/users/profile",
                get(Self::get_profile_handler).put(Self::update_profile_handler),
            )
            // Blockchain identity
            .route(
                "/api/blockchain/identity",
                post(Self::create_identity_handler).get(Self::get_identity_handler),
            )
            .route("/api/blockchain/identity/verify", put(Self::verify_identity_handler))
            .route("/api/blockchain/identity/revoke", put(Self::revoke_identity_handler))
            // Documents
            .route("/api/documents", get(Self::list_documents_handler))
            .route("/api/documents/upload", post(Self::upload_document_handler))
            .route("/api/documents/pending", get(Self::pending_documents_handler))
            .route("/api/documents/submit-verification", post(Self::submit_handler))
            .route("/api/documents/verify/:id", put(Self::verify_document_handler))
            .route("/api/documents/admin-verify/:id", post(Self::review_document_handler))
            .route("/api/documents/enable-multisig", post(Self::enable_multisig_handler))
            .route("/api/documents/:id/signatures", post(Self::add_signature_handler))
            .route("/api/documents/:id/multisig", get(Self::multisig_status_handler))
            .route("/api/documents/:id/chain-status", get(Self::chain_status_handler))
            .route("/api/documents/download/:id", get(Self::download_handler))
            // IPFS
            .route("/api/ipfs/content/:cid", get(Self::ipfs_content_handler))
            .route("/api/ipfs/download/:id", get(Self::download_handler))
            // Share links
            .route("/api/verification/create-share", post(Self::create_share_handler))
            .route("/api/verification/share", get(Self::resolve_share_handler))
            // Access logs
            .route(
                "/api/logs",
                post(Self::log_access_handler).get(Self::access_logs_handler),
            )
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(cors)
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "0.0.0.0:8000")
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, app).await
    }

    async fn health_handler() -> Json<Value> {
        Json(json!({ "success": true, "status": "ok" }))
    }

    // ---------------------------------------------------------------------
    // Accounts
    // ---------------------------------------------------------------------

    async fn register_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RegisterRequest>,
    ) -> Result<impl IntoResponse, ApiError> {
        let (user, token) = state.accounts.register(payload).await?;
        Ok((
            StatusCode::CREATED,
            Json(json!({ "success": true, "token": token, "user": user })),
        ))
    }

    async fn login_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<LoginRequest>,
    ) -> Result<Json<Value>, ApiError> {
        let (user, token) = state.accounts.login(payload).await?;
        Ok(Json(json!({ "success": true, "token": token, "user": user })))
    }

    async fn get_profile_handler(AuthUser(user): AuthUser) -> Json<Value> {
        Json(json!({ "success": true, "user": user }))
    }

    async fn update_profile_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
        Json(payload): Json<ProfileUpdate>,
    ) -> Result<Json<Value>, ApiError> {
        let user = state.accounts.update_profile(&user, payload).await?;
        Ok(Json(json!({ "success": true, "user": user })))
    }

    // ---------------------------------------------------------------------
    // Blockchain identity
    // ---------------------------------------------------------------------

    async fn create_identity_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
    ) -> Result<impl IntoResponse, ApiError> {
        let identity = state.identities.create(user.id).await?;
        Ok((
            StatusCode::CREATED,
            Json(json!({ "success": true, "identity": identity })),
        ))
    }

    async fn get_identity_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
    ) -> Result<Json<Value>, ApiError> {
        let identity = state.identities.get(user.id).await?;
        Ok(Json(json!({ "success": true, "identity": identity })))
    }

    async fn verify_identity_handler(
        State(state): State<Arc<ApiServer>>,
        AdminUser(_admin): AdminUser,
        Json(payload): Json<VerifyIdentityRequest>,
    ) -> Result<Json<Value>, ApiError> {
        let identity = state.identities.verify(payload.user_id).await?;
        Ok(Json(json!({ "success": true, "identity": identity })))
    }

    async fn revoke_identity_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
    ) -> Result<Json<Value>, ApiError> {
        let identity = state.identities.revoke(user.id).await?;
        Ok(Json(json!({ "success": true, "identity": identity })))
    }

    // ---------------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------------

    async fn list_documents_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
    ) -> Json<Value> {
        let documents = state.documents.list_own(&user).await;
        Json(json!({ "success": true, "documents": documents }))
    }

    /// Multipart upload with a `document` file field and a `documentType` text field.
    async fn upload_document_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
        mut multipart: Multipart,
    ) -> Result<impl IntoResponse, ApiError> {
        let mut file = None;
        let mut document_type = String::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "document" => {
                    let file_name = field
                        .file_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| "document".to_string());
                    let content_type = field.content_type().map(str::to_string);
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(e.body_text()))?;
                    file = Some(UploadedFile {
                        file_name,
                        content_type,
                        data: data.to_vec(),
                    });
                }
                "documentType" => {
                    document_type = field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(e.body_text()))?;
                }
                _ => {}
            }
        }

        let file = file.ok_or_else(|| ApiError::bad_request("Document file and type are required"))?;
        let document = state.documents.upload(&user, &document_type, file).await?;
        Ok((
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "Document uploaded successfully",
                "document": document,
            })),
        ))
    }

    async fn pending_documents_handler(
        State(state): State<Arc<ApiServer>>,
        AdminUser(_admin): AdminUser,
    ) -> Json<Value> {
        let documents = state.documents.list_pending().await;
        Json(json!({ "success": true, "documents": documents }))
    }

    async fn submit_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
        Json(payload): Json<SubmitRequest>,
    ) -> Result<Json<Value>, ApiError> {
        let count = state.documents.submit(&user, &payload.document_ids).await?;
        Ok(Json(json!({
            "success": true,
            "message": format!("{} document(s) submitted for verification", count),
            "count": count,
        })))
    }

    async fn verify_document_handler(
        State(state): State<Arc<ApiServer>>,
        AdminUser(admin): AdminUser,
        Path(id): Path<Uuid>,
    ) -> Result<Json<Value>, ApiError> {
        let document = state.documents.verify(&admin, id, None).await?;
        Ok(Json(json!({
            "success": true,
            "message": "Document verified successfully",
            "document": document,
        })))
    }

    async fn review_document_handler(
        State(state): State<Arc<ApiServer>>,
        AdminUser(admin): AdminUser,
        Path(id): Path<Uuid>,
        Json(payload): Json<ReviewRequest>,
    ) -> Result<Json<Value>, ApiError> {
        let document = state
            .documents
            .review(&admin, id, payload.action, payload.feedback)
            .await?;
        let message = match payload.action {
            ReviewAction::Verify => "Document verified successfully",
            ReviewAction::Reject => "Document rejected",
        };
        Ok(Json(json!({ "success": true, "message": message, "document": document })))
    }

    async fn enable_multisig_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
        Json(payload): Json<EnableMultiSigRequest>,
    ) -> Result<Json<Value>, ApiError> {
        let document = state.multisig.enable(&user, payload).await?;
        Ok(Json(json!({
            "success": true,
            "message": "Multi-signature verification enabled",
            "document": document,
        })))
    }

    /// The body is optional; an empty request signs without a detached signature.
    async fn add_signature_handler(
        State(state): State<Arc<ApiServer>>,
        AdminUser(admin): AdminUser,
        Path(id): Path<Uuid>,
        payload: Option<Json<SignRequest>>,
    ) -> Result<Json<Value>, ApiError> {
        let request = payload.map(|Json(r)| r).unwrap_or_default();
        let (document, completed) = state.multisig.add_signature(&admin, id, request).await?;
        let message = if completed {
            "Signature added. Document is now verified"
        } else {
            "Signature added"
        };
        Ok(Json(json!({
            "success": true,
            "message": message,
            "isMultiSigComplete": completed,
            "document": document,
        })))
    }

    async fn multisig_status_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
        Path(id): Path<Uuid>,
    ) -> Result<Json<Value>, ApiError> {
        let status = state.multisig.status(&user, id).await?;
        Ok(Json(json!({ "success": true, "status": status })))
    }

    async fn chain_status_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
        Path(id): Path<Uuid>,
    ) -> Result<Json<Value>, ApiError> {
        let status = state.documents.chain_status(&user, id).await?;
        Ok(Json(json!({ "success": true, "documentId": id, "chainStatus": status })))
    }

    async fn download_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
        Path(id): Path<Uuid>,
        headers: HeaderMap,
    ) -> Result<Response, ApiError> {
        let content = state.documents.download(&user, id).await?;
        let accessed_by = if user.is_admin {
            AccessedBy::Admin
        } else {
            AccessedBy::User
        };
        state
            .audit(Some(user.id), "document", id.to_string(), "download", accessed_by, &headers)
            .await;
        Ok(content_response(content, true))
    }

    async fn ipfs_content_handler(
        State(state): State<Arc<ApiServer>>,
        Path(cid): Path<String>,
    ) -> Result<Response, ApiError> {
        let content = state.documents.content_by_cid(&cid).await?;
        Ok(content_response(content, false))
    }

    // ---------------------------------------------------------------------
    // Share links
    // ---------------------------------------------------------------------

    async fn create_share_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
        Json(payload): Json<CreateShareRequest>,
    ) -> Result<impl IntoResponse, ApiError> {
        let share = state.shares.create(&user, payload).await?;
        Ok((
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "code": share.code,
                "expiresAt": share.expires_at,
                "verificationUrl": share.verification_url,
            })),
        ))
    }

    async fn resolve_share_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<ShareQuery>,
        headers: HeaderMap,
    ) -> Result<Json<Value>, ApiError> {
        let code = query.code.unwrap_or_default();
        let shared = state.shares.resolve(&code).await?;
        state
            .audit(None, "share", code, "view", AccessedBy::ThirdParty, &headers)
            .await;

        let mut body = serde_json::to_value(&shared)
            .map_err(|e| ApiError::Internal(format!("Failed to encode share: {}", e)))?;
        if let Value::Object(map) = &mut body {
            map.insert("success".to_string(), Value::Bool(true));
        }
        Ok(Json(body))
    }

    // ---------------------------------------------------------------------
    // Access logs
    // ---------------------------------------------------------------------

    async fn log_access_handler(
        State(state): State<Arc<ApiServer>>,
        AuthUser(user): AuthUser,
        headers: HeaderMap,
        Json(payload): Json<LogAccessRequest>,
    ) -> Result<impl IntoResponse, ApiError> {
        let log = state
            .access_logs
            .record(Some(user.id), payload, ClientInfo::from_headers(&headers))
            .await?;
        Ok((
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "Access logged successfully",
                "logId": log.id,
            })),
        ))
    }

    async fn access_logs_handler(
        State(state): State<Arc<ApiServer>>,
        AdminUser(_admin): AdminUser,
        Query(query): Query<AccessLogQuery>,
    ) -> Result<Json<Value>, ApiError> {
        let results = state.access_logs.query(query).await?;
        let mut body = serde_json::to_value(&results)
            .map_err(|e| ApiError::Internal(format!("Failed to encode access logs: {}", e)))?;
        if let Value::Object(map) = &mut body {
            map.insert("success".to_string(), Value::Bool(true));
        }
        Ok(Json(body))
    }

    /// Records an access event. Audit failures never fail the request.
    async fn audit(
        &self,
        user_id: Option<Uuid>,
        resource_type: &str,
        resource_id: String,
        action: &str,
        accessed_by: AccessedBy,
        headers: &HeaderMap,
    ) {
        let request = LogAccessRequest {
            resource_type: resource_type.to_string(),
            resource_id,
            action: action.to_string(),
            accessed_by,
        };
        if let Err(e) = self
            .access_logs
            .record(user_id, request, ClientInfo::from_headers(headers))
            .await
        {
            warn!("Failed to record {} access: {}", resource_type, e);
        }
    }
}

/// Raw document bytes with their MIME type; `attachment` adds a
/// `Content-Disposition` with the sanitized file name.
fn content_response(content: DocumentContent, attachment: bool) -> Response {
    let mut response = (StatusCode::OK, content.data).into_response();
    let headers = response.headers_mut();

    let content_type = HeaderValue::from_str(&content.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);

    if attachment {
        let file_name = sanitize_filename(content.file_name.as_deref().unwrap_or("document"));
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name)) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }
    response
}
