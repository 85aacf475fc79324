//! HTTP ingress: programmatic announcement creation and a health check.

use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use ntb_core::{
    broadcast::DeliveryReport,
    domain::{Announcement, Category},
    services::Services,
    validation::AnnouncementInput,
};

use crate::error::ApiError;

const MISSING_FIELDS: &str = "Title, message and tag are required";

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/announcements", post(create_announcement))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled, then drain in-flight requests.
pub async fn serve(
    services: Services,
    bind: SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "http ingress listening");

    axum::serve(listener, build_router(AppState { services }))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Default, Deserialize)]
struct CreateAnnouncementRequest {
    title: Option<String>,
    message: Option<String>,
    tag: Option<String>,
}

#[derive(Serialize)]
struct CreateAnnouncementResponse {
    success: bool,
    announcement: Announcement,
    delivery: DeliveryReport,
}

/// HTTP-created announcements never carry attachments.
async fn create_announcement(
    State(state): State<AppState>,
    body: Result<Json<CreateAnnouncementRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateAnnouncementResponse>), ApiError> {
    let Json(req) = body.map_err(|e| {
        tracing::debug!(error = %e, "rejected announcement body");
        ApiError::BadRequest(MISSING_FIELDS.to_string())
    })?;

    let (Some(title), Some(message), Some(tag)) = (
        non_blank(req.title),
        non_blank(req.message),
        non_blank(req.tag),
    ) else {
        return Err(ApiError::BadRequest(MISSING_FIELDS.to_string()));
    };

    let tag = tag.trim().to_lowercase();
    if Category::from_tag(&tag).is_none() {
        let allowed = Category::ALL.map(Category::tag).join(", ");
        return Err(ApiError::BadRequest(format!(
            "Invalid tag. Allowed tags: {allowed}"
        )));
    }

    let services = &state.services;
    let published = services
        .publisher
        .publish_input(
            AnnouncementInput {
                title: Some(&title),
                body: Some(&message),
                tag: Some(&tag),
            },
            Vec::new(),
            services.cfg.http_author_id.clone(),
        )
        .await?;

    tracing::info!(
        announcement = %published.announcement.id,
        delivered = published.report.delivered,
        attempted = published.report.attempted,
        "announcement created via http"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateAnnouncementResponse {
            success: true,
            announcement: published.announcement,
            delivery: published.report,
        }),
    ))
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}
