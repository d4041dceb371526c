//! HTTP endpoints for the daemon using axum.
//!
//! Endpoints:
//! - GET    /health                  - service status and enrolled identities
//! - POST   /enroll                  - multipart `student_id` + `image`
//! - POST   /recognize               - multipart `image`, returns matches
//! - GET    /enrolled                - enrolled identities
//! - DELETE /unenroll/:student_id    - remove an identity

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use facematch_core::{
    normalize_student_id, validate_for_enrollment, EuclideanMatcher, FaceMatch, Matcher,
};
use facematch_store::FaceStore;

use crate::engine::EngineHandle;
use crate::error::ApiError;

/// The enrollment store behind a mutex held for each whole mutate-and-persist sequence.
pub type SharedStore = Arc<Mutex<Box<dyn FaceStore>>>;

/// Combined application state.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub engine: EngineHandle,
}

impl AppState {
    pub fn new(store: Box<dyn FaceStore>, engine: EngineHandle) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            engine,
        }
    }
}

/// Build the axum router with all endpoints.
pub fn router(state: AppState, max_upload_bytes: usize, cors_enabled: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/enroll", post(enroll))
        .route("/recognize", post(recognize))
        .route("/enrolled", get(enrolled))
        .route("/unenroll/:student_id", delete(unenroll))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

// ── Request / Response types ────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub enrolled: usize,
    pub students: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct EnrollResponse {
    pub success: bool,
    pub student_id: String,
    pub message: String,
    pub total_enrolled: usize,
}

#[derive(Serialize, Deserialize)]
pub struct EnrolledResponse {
    pub enrolled_students: Vec<String>,
    pub count: usize,
}

#[derive(Serialize, Deserialize)]
pub struct UnenrollResponse {
    pub success: bool,
    pub message: String,
}

/// Fields pulled out of a multipart upload. Unknown fields are ignored.
#[derive(Default)]
struct Upload {
    student_id: Option<String>,
    image: Option<Vec<u8>>,
}

impl Upload {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut upload = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("student_id") => upload.student_id = Some(field.text().await?),
                Some("image") => {
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        upload.image = Some(bytes.to_vec());
                    }
                }
                _ => {}
            }
        }
        Ok(upload)
    }
}

// ── Handlers ────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.store.lock().await;
    Json(HealthResponse {
        status: "ok".into(),
        service: "face-recognition".into(),
        enrolled: store.len(),
        students: store.all_keys(),
    })
}

async fn enroll(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EnrollResponse>, ApiError> {
    let upload = Upload::read(multipart).await?;
    let student_id = upload
        .student_id
        .as_deref()
        .and_then(normalize_student_id)
        .ok_or(ApiError::MissingField("student_id"))?;
    let image = upload.image.ok_or(ApiError::MissingField("image file"))?;

    let faces = state.engine.detect_and_encode(image).await?;
    tracing::info!(student_id = %student_id, faces = faces.len(), "enroll: faces detected");
    let embedding = validate_for_enrollment(faces)?;

    let mut store = state.store.lock().await;
    let student_id = store.put(&student_id, embedding)?;
    let total_enrolled = store.len();
    drop(store);

    tracing::info!(student_id = %student_id, total_enrolled, "enrolled");
    Ok(Json(EnrollResponse {
        success: true,
        student_id,
        message: "Face enrolled successfully".into(),
        total_enrolled,
    }))
}

async fn recognize(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Vec<FaceMatch>>, ApiError> {
    let upload = Upload::read(multipart).await?;
    let image = upload.image.ok_or(ApiError::MissingField("image file"))?;

    let faces = state.engine.detect_and_encode(image).await?;
    tracing::info!(faces = faces.len(), "recognize: faces detected");
    if faces.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let queries: Vec<_> = faces.into_iter().map(|f| f.embedding).collect();
    let store = state.store.lock().await;
    if store.is_empty() {
        tracing::warn!("recognize: no enrolled students yet");
        return Ok(Json(Vec::new()));
    }
    let matches = EuclideanMatcher::new().match_all(&queries, store.entries());
    drop(store);

    for m in &matches {
        tracing::info!(
            student_id = %m.student_id,
            confidence = m.confidence,
            distance = m.distance,
            "recognize: match"
        );
    }
    tracing::info!(queries = queries.len(), matched = matches.len(), "recognize: complete");
    Ok(Json(matches))
}

async fn enrolled(State(state): State<AppState>) -> Json<EnrolledResponse> {
    let store = state.store.lock().await;
    Json(EnrolledResponse {
        enrolled_students: store.all_keys(),
        count: store.len(),
    })
}

/// The path key is normalized like an enroll key: surrounding whitespace is
/// trimmed and the rest upper-cased, so `/unenroll/%20s1` removes `S1`.
async fn unenroll(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<UnenrollResponse>, ApiError> {
    let key = normalize_student_id(&student_id).ok_or_else(|| ApiError::NotFound(student_id))?;

    let removed = state
        .store
        .lock()
        .await
        .remove(&key)?;
    if !removed {
        return Err(ApiError::NotFound(key));
    }

    tracing::info!(student_id = %key, "unenrolled");
    Ok(Json(UnenrollResponse {
        success: true,
        message: format!("Student {key} unenrolled"),
    }))
}
