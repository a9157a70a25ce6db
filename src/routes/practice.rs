use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::engine::service::{AnswerSubmission, KnowledgeState};
use crate::engine::PracticeSelection;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::catalog::Item;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/answers", post(submit_answer))
        .route("/learners/:learner_id/next", get(next_item))
        .route("/learners/:learner_id/mastery", get(mastery))
        .route("/learners/:learner_id/mistakes", get(mistakes))
        .route("/learners/:learner_id/answers", get(recent_answers))
}

async fn submit_answer(
    State(state): State<AppState>,
    JsonBody(submission): JsonBody<AnswerSubmission>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.engine().submit_answer(submission).await?;
    Ok(ok(outcome))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NextItemResponse {
    available: bool,
    item: Option<Item>,
    strategy_code: Option<&'static str>,
    strategy_label: Option<&'static str>,
}

impl From<Option<PracticeSelection>> for NextItemResponse {
    fn from(selection: Option<PracticeSelection>) -> Self {
        match selection {
            Some(PracticeSelection { item, strategy }) => Self {
                available: true,
                item: Some(item),
                strategy_code: Some(strategy.code()),
                strategy_label: Some(strategy.label()),
            },
            None => Self {
                available: false,
                item: None,
                strategy_code: None,
                strategy_label: None,
            },
        }
    }
}

async fn next_item(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let selection = state.engine().select_next_item(&learner_id).await?;
    Ok(ok(NextItemResponse::from(selection)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MasteryResponse {
    learner_id: String,
    topics: Vec<KnowledgeState>,
}

async fn mastery(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let topics = state.engine().knowledge_states(&learner_id).await?;
    Ok(ok(MasteryResponse { learner_id, topics }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    limit: Option<usize>,
    #[serde(default)]
    include_resolved: bool,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

async fn mistakes(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let entries = state
        .engine()
        .list_mistakes(&learner_id, q.include_resolved, q.limit())
        .await?;
    Ok(ok(entries))
}

async fn recent_answers(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let answers = state.engine().recent_answers(&learner_id, q.limit()).await?;
    Ok(ok(answers))
}
