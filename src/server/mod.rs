//! HTTP surface over the story and saved directories.
//!
//! Read-only apart from save/unsave, which copy or remove files in the
//! saved directory. Filenames from the path are validated by the saved
//! store before anything touches disk.

use std::path::PathBuf;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::SaveError;
use crate::stories::{SavedStore, StoryRecord, StoryStore};

const INDEX_HTML: &str = include_str!("index.html");

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    stories: StoryStore,
    saved: SavedStore,
}

impl AppState {
    pub fn new(storydir: impl Into<PathBuf>, savedir: impl Into<PathBuf>) -> Self {
        let storydir = storydir.into();
        Self {
            stories: StoryStore::new(storydir.clone()),
            saved: SavedStore::new(storydir, savedir),
        }
    }
}

/// A story plus whether a saved copy exists.
#[derive(Debug, Serialize)]
struct StoryView {
    #[serde(flatten)]
    story: StoryRecord,
    saved: bool,
}

/// Build the router.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/stories", get(list_stories))
        .route(
            "/api/stories/{filename}/save",
            post(save_story).delete(unsave_story),
        )
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "UI server listening");
    axum::serve(listener, routes(state)).await
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ── Stories ─────────────────────────────────────────────────────────────

async fn list_stories(State(state): State<AppState>) -> Response {
    let joined = tokio::task::spawn_blocking(move || {
        let stories = state.stories.read_all()?;
        let saved = state.saved.list()?;
        let views: Vec<StoryView> = stories
            .into_iter()
            .map(|story| {
                let saved = story
                    .filename
                    .as_deref()
                    .is_some_and(|name| saved.contains(name));
                StoryView { story, saved }
            })
            .collect();
        Ok::<_, crate::Error>(views)
    })
    .await;

    match joined {
        Ok(Ok(views)) => Json(views).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "Failed to read stories");
            internal_error()
        }
        Err(e) => {
            error!(error = %e, "Story listing task failed");
            internal_error()
        }
    }
}

// ── Save / unsave ───────────────────────────────────────────────────────

async fn save_story(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    let name = filename.clone();
    let joined = tokio::task::spawn_blocking(move || state.saved.save(&name)).await;

    match joined {
        Ok(Ok(())) => StatusCode::CREATED.into_response(),
        Ok(Err(e)) => save_error_response(&filename, "save", e),
        Err(e) => {
            error!(error = %e, "Save task failed");
            internal_error()
        }
    }
}

async fn unsave_story(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    let name = filename.clone();
    let joined = tokio::task::spawn_blocking(move || state.saved.unsave(&name)).await;

    match joined {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => save_error_response(&filename, "unsave", e),
        Err(e) => {
            error!(error = %e, "Unsave task failed");
            internal_error()
        }
    }
}

fn save_error_response(filename: &str, action: &str, err: SaveError) -> Response {
    match err {
        SaveError::InvalidFilename(_) => {
            warn!(filename, action, "Invalid filename in request");
            error_response(StatusCode::BAD_REQUEST, "invalid filename")
        }
        SaveError::AlreadySaved(_) => {
            error_response(StatusCode::CONFLICT, "story is already saved")
        }
        SaveError::NotFound(_) if action == "unsave" => {
            error_response(StatusCode::NOT_FOUND, "story is not saved")
        }
        SaveError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "story not found"),
        SaveError::Io { .. } => {
            error!(filename, action, error = %err, "Failed to update saved stories");
            internal_error()
        }
    }
}
