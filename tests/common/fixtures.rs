use axum::http::{Method, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use ufam_hub_backend::services::reviews::FlashcardWithReview;
use ufam_hub_backend::store::operations::reviews::ReviewRecord;

use super::auth::bearer;
use super::http::{read_data, request, response_json};

/// Creates a card through the API and returns its JSON.
pub async fn create_card(app: &Router, token: &str, front: &str, back: &str) -> Value {
    let response = request(
        app,
        Method::POST,
        "/api/flashcards",
        Some(json!({ "front": front, "back": back, "tags": ["calculo"] })),
        &bearer(token),
    )
    .await;
    let (status, _, body) = response_json(response).await;
    assert!(status.is_success(), "create card failed: {body}");
    body["data"].clone()
}

/// Raw status and body, for tests that expect the submission to fail.
pub async fn submit_review(app: &Router, token: &str, flashcard_id: &str, quality: i64) -> (u16, Value) {
    let response = request(
        app,
        Method::POST,
        "/api/reviews",
        Some(json!({ "flashcardId": flashcard_id, "qualityRating": quality })),
        &bearer(token),
    )
    .await;
    let (status, _, body) = response_json(response).await;
    (status.as_u16(), body)
}

/// Submits a review that must succeed and returns the stored record.
pub async fn record_review(app: &Router, token: &str, flashcard_id: &str, quality: i64) -> ReviewRecord {
    let response = request(
        app,
        Method::POST,
        "/api/reviews",
        Some(json!({ "flashcardId": flashcard_id, "qualityRating": quality })),
        &bearer(token),
    )
    .await;
    read_data(response, StatusCode::CREATED).await
}

pub async fn due_cards(app: &Router, token: &str) -> Vec<Value> {
    let response = request(
        app,
        Method::GET,
        "/api/flashcards?dueOnly=true",
        None,
        &bearer(token),
    )
    .await;
    let (status, _, body) = response_json(response).await;
    assert!(status.is_success(), "due list failed: {body}");
    body["data"].as_array().cloned().unwrap_or_default()
}

/// Card detail: the card plus its latest review.
pub async fn card_detail(app: &Router, token: &str, flashcard_id: &str) -> FlashcardWithReview {
    let response = request(
        app,
        Method::GET,
        &format!("/api/flashcards/{flashcard_id}"),
        None,
        &bearer(token),
    )
    .await;
    read_data(response, StatusCode::OK).await
}
