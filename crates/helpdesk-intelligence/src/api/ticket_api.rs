// Ticket workflow API: intake, resolution and support-agent drafts

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use super::ApiError;
use crate::error::PipelineError;
use crate::llm::AttachmentRef;
use crate::pipeline::{DraftedResponse, PipelineResult, Resolution};
use crate::shared_state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntakeRequest {
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: String,
    pub resolved_by: String,
}

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub message: String,
}

impl IntakeRequest {
    /// An empty body means no attachments; anything else must parse.
    fn from_body(body: &[u8]) -> Result<Self, PipelineError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| PipelineError::InvalidInput(format!("malformed intake body: {}", e)))
    }
}

/// Run intake for a stored ticket. The body is optional.
pub async fn intake_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    body: Bytes,
) -> Result<Json<PipelineResult>, ApiError> {
    let request = IntakeRequest::from_body(&body)?;
    info!("Intake requested for ticket {} ({} attachment(s))", ticket_id, request.attachments.len());

    let ticket = state
        .database
        .tickets
        .get_ticket(&ticket_id)
        .map_err(PipelineError::from)?
        .ok_or_else(|| PipelineError::NotFound {
            entity: "ticket",
            id: ticket_id.clone(),
        })?;

    let outcome = state
        .pipeline
        .process_new_ticket(&ticket, &request.attachments)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn resolve_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<PipelineResult>, ApiError> {
    info!("Resolution requested for ticket {} by {}", ticket_id, request.resolved_by);
    let resolution = Resolution {
        content: request.resolution,
        resolved_by: request.resolved_by,
    };
    let outcome = state
        .pipeline
        .process_ticket_resolution(&ticket_id, &resolution)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn draft_response(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(request): Json<DraftRequest>,
) -> Result<Json<DraftedResponse>, ApiError> {
    let drafted = state
        .pipeline
        .draft_support_response(&ticket_id, &request.message)
        .await?;
    Ok(Json(drafted))
}
