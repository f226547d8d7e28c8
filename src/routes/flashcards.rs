use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::constants::{
    DEFAULT_DUE_LIMIT, DEFAULT_HISTORY_LIMIT, DEFAULT_PAGE_SIZE, MAX_BATCH_CARDS, MAX_DUE_LIMIT,
    MAX_HISTORY_LIMIT, MAX_PAGE_SIZE,
};
use crate::extractors::{JsonBody, QueryParams};
use crate::response::{created, ok, paginated, AppError};
use crate::services::reviews::{
    list_due_flashcards, list_flashcards_with_reviews, schedule_for, FlashcardWithReview,
};
use crate::state::AppState;
use crate::store::operations::flashcards::{CardDifficulty, Flashcard};
use crate::validation::{validate_card_text, validate_subject_id, validate_tags};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_flashcards).post(create_flashcard))
        .route("/batch", post(create_flashcards_batch))
        .route(
            "/:id",
            get(get_flashcard).put(update_flashcard).delete(delete_flashcard),
        )
        .route("/:id/reviews", get(review_history))
        .route("/:id/schedule", get(schedule))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub due_only: Option<bool>,
    pub limit: Option<usize>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlashcardRequest {
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub subject_id: Option<String>,
    pub difficulty: Option<CardDifficulty>,
    #[serde(default)]
    pub ai_generated: bool,
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateRequest {
    pub flashcards: Vec<CreateFlashcardRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateResponse {
    pub count: usize,
    pub flashcards: Vec<Flashcard>,
}

/// Partial update; absent fields keep their value. A blank `subjectId`
/// clears the subject.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFlashcardRequest {
    pub front: Option<String>,
    pub back: Option<String>,
    pub tags: Option<Vec<String>>,
    pub subject_id: Option<String>,
    pub difficulty: Option<CardDifficulty>,
}

fn validation_error(message: String) -> AppError {
    AppError::bad_request("VALIDATION_ERROR", &message)
}

fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, AppError> {
    validate_tags(&tags).map_err(validation_error)?;
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    Ok(out)
}

fn normalize_subject(subject_id: Option<String>) -> Result<Option<String>, AppError> {
    match subject_id.map(|s| s.trim().to_string()) {
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => {
            validate_subject_id(&s).map_err(validation_error)?;
            Ok(Some(s))
        }
        None => Ok(None),
    }
}

fn build_flashcard(
    user_id: &str,
    req: CreateFlashcardRequest,
    now: DateTime<Utc>,
) -> Result<Flashcard, AppError> {
    validate_card_text("front", &req.front).map_err(validation_error)?;
    validate_card_text("back", &req.back).map_err(validation_error)?;

    Ok(Flashcard {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        front: req.front.trim().to_string(),
        back: req.back.trim().to_string(),
        tags: normalize_tags(req.tags)?,
        subject_id: normalize_subject(req.subject_id)?,
        difficulty: req.difficulty.unwrap_or_default(),
        ai_generated: req.ai_generated,
        created_at: now,
        updated_at: now,
    })
}

fn find_owned(state: &AppState, user_id: &str, id: &str) -> Result<Flashcard, AppError> {
    state
        .store()
        .get_user_flashcard(user_id, id)?
        .ok_or_else(|| AppError::not_found("Flashcard not found"))
}

/// Items to skip before `page`. Saturates for pages far past the end.
fn page_offset(page: u64, per_page: u64) -> usize {
    let offset = page.saturating_sub(1).saturating_mul(per_page);
    usize::try_from(offset).unwrap_or(usize::MAX)
}

/// `dueOnly=true` returns the review queue; otherwise a page of all cards.
async fn list_flashcards(
    auth_user: AuthUser,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListQuery>,
) -> Result<Response, AppError> {
    if query.due_only.unwrap_or(false) {
        let limit = query.limit.unwrap_or(DEFAULT_DUE_LIMIT).clamp(1, MAX_DUE_LIMIT);
        let due = list_due_flashcards(state.store(), state.clock(), &auth_user.user_id, limit)?;
        return Ok(ok(due).into_response());
    }

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let all = list_flashcards_with_reviews(state.store(), &auth_user.user_id)?;
    let total = all.len() as u64;
    let items: Vec<FlashcardWithReview> = all
        .into_iter()
        .skip(page_offset(page, per_page))
        .take(per_page as usize)
        .collect();

    Ok(paginated(items, total, page, per_page).into_response())
}

async fn create_flashcard(
    auth_user: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateFlashcardRequest>,
) -> Result<impl IntoResponse, AppError> {
    let card = build_flashcard(&auth_user.user_id, req, state.clock().now())?;
    state.store().create_flashcard(&card)?;
    tracing::debug!(user_id = %auth_user.user_id, flashcard_id = %card.id, "Flashcard created");
    Ok(created(card))
}

/// All cards are validated before any is written.
async fn create_flashcards_batch(
    auth_user: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BatchCreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.flashcards.is_empty() || req.flashcards.len() > MAX_BATCH_CARDS {
        return Err(AppError::bad_request(
            "VALIDATION_ERROR",
            &format!("flashcards must contain between 1 and {MAX_BATCH_CARDS} cards"),
        ));
    }

    let now = state.clock().now();
    let cards = req
        .flashcards
        .into_iter()
        .map(|item| build_flashcard(&auth_user.user_id, item, now))
        .collect::<Result<Vec<_>, _>>()?;

    for card in &cards {
        state.store().create_flashcard(card)?;
    }
    tracing::info!(user_id = %auth_user.user_id, count = cards.len(), "Flashcards created in batch");

    Ok(created(BatchCreateResponse {
        count: cards.len(),
        flashcards: cards,
    }))
}

async fn get_flashcard(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let flashcard = find_owned(&state, &auth_user.user_id, &id)?;
    let latest_review = state
        .store()
        .get_latest_review_record(&id, &auth_user.user_id)?;
    Ok(ok(FlashcardWithReview {
        flashcard,
        latest_review,
    }))
}

async fn update_flashcard(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateFlashcardRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut card = find_owned(&state, &auth_user.user_id, &id)?;

    if let Some(front) = req.front {
        validate_card_text("front", &front).map_err(validation_error)?;
        card.front = front.trim().to_string();
    }
    if let Some(back) = req.back {
        validate_card_text("back", &back).map_err(validation_error)?;
        card.back = back.trim().to_string();
    }
    if let Some(tags) = req.tags {
        card.tags = normalize_tags(tags)?;
    }
    if req.subject_id.is_some() {
        card.subject_id = normalize_subject(req.subject_id)?;
    }
    if let Some(difficulty) = req.difficulty {
        card.difficulty = difficulty;
    }
    card.updated_at = state.clock().now();

    state.store().update_flashcard(&card)?;
    Ok(ok(card))
}

async fn delete_flashcard(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    find_owned(&state, &auth_user.user_id, &id)?;
    if !state.store().delete_flashcard(&id)? {
        return Err(AppError::not_found("Flashcard not found"));
    }
    tracing::info!(user_id = %auth_user.user_id, flashcard_id = %id, "Flashcard deleted");
    Ok(ok(serde_json::json!({ "deleted": true })))
}

async fn review_history(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    find_owned(&state, &auth_user.user_id, &id)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let records = state
        .store()
        .list_review_records(&id, &auth_user.user_id, limit)?;
    Ok(ok(records))
}

async fn schedule(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = schedule_for(
        state.store(),
        state.scheduler(),
        state.clock(),
        &auth_user.user_id,
        &id,
    )?;
    Ok(ok(view))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(front: &str, back: &str) -> CreateFlashcardRequest {
        CreateFlashcardRequest {
            front: front.to_string(),
            back: back.to_string(),
            tags: vec![" calculus ".to_string(), "calculus".to_string()],
            subject_id: Some("  ".to_string()),
            difficulty: None,
            ai_generated: true,
        }
    }

    #[test]
    fn build_trims_and_defaults() {
        let card = build_flashcard("u1", request(" front ", "back"), Utc::now()).unwrap();
        assert_eq!(card.front, "front");
        assert_eq!(card.tags, vec!["calculus".to_string()]);
        assert_eq!(card.subject_id, None);
        assert_eq!(card.difficulty, CardDifficulty::Medium);
        assert!(card.ai_generated);
        assert_eq!(card.created_at, card.updated_at);
    }

    #[test]
    fn page_offset_saturates() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
        assert_eq!(page_offset(u64::MAX, MAX_PAGE_SIZE), usize::MAX);
    }

    #[test]
    fn build_rejects_blank_sides() {
        let err = build_flashcard("u1", request("", "back"), Utc::now()).unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert!(build_flashcard("u1", request("front", "  "), Utc::now()).is_err());
    }
}
