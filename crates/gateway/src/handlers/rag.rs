//! Knowledge base question handlers

use crate::AppState;
use axum::{extract::State, Json};
use ragforge_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct GlobalQuestionRequest {
    #[validate(length(min = 1, max = 4000))]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerData {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct GlobalAnswerResponse {
    pub message: String,
    pub data: AnswerData,
}

/// Answer a question against every persisted document
pub async fn ask_global(
    State(state): State<AppState>,
    Json(request): Json<GlobalQuestionRequest>,
) -> Result<Json<GlobalAnswerResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    let answer = state
        .orchestrator
        .answer_global_question(&request.question)
        .await?;

    Ok(Json(GlobalAnswerResponse {
        message: "Global search completed".to_string(),
        data: AnswerData {
            question: request.question,
            answer,
        },
    }))
}
