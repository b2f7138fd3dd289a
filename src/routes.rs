use axum::{
    Json, Router,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response, sse::{Event, KeepAlive, Sse}},
    routing::{get, post, put},
};
use futures::{Stream, StreamExt};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::{
    autosave::Autosave,
    chunker,
    error::StudioError,
    export::{export, ExportFormat},
    models::{EditChunkRequest, GenerationParameters, HistoryRecord, Preferences, PreferencesUpdate, RecordView},
    studio::Studio,
};

#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Studio>,
    pub autosave: Arc<Autosave>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/generate/once", post(generate_once))
        .route("/api/history", get(list_history).delete(clear_history))
        .route("/api/history/:id", get(get_record))
        .route("/api/history/:id/chunks/:chunk_id", put(edit_chunk).delete(delete_chunk))
        .route("/api/history/:id/chunks/:chunk_id/draft", put(draft_chunk))
        .route("/api/history/:id/chunks/:chunk_id/regenerate", post(regenerate_chunk))
        .route("/api/history/:id/export/:format", get(export_record))
        .route("/api/preferences", get(get_preferences).put(update_preferences))
        .with_state(state)
}

/// Streams the generation as server-sent events: one `fragment` event per
/// piece of text as it arrives, then `complete` with the saved record and its
/// chunks, or `error`. Fragments already sent stay sent when the stream fails.
pub async fn generate(
    State(state): State<AppState>,
    Json(params): Json<GenerationParameters>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StudioError> {
    params.validate()?;
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    tokio::spawn(async move {
        let fragments = tx.clone();
        let mut on_fragment = move |text: &str| {
            // a gone client only stops receiving; the generation still completes and is saved
            let _ = fragments.send(Event::default().event("fragment").data(sse_data(text)));
        };
        let event = match state.studio.generate(params, &mut on_fragment).await {
            Ok(record) => Event::default()
                .event("complete")
                .json_data(RecordView::from(record))
                .unwrap_or_else(|e| Event::default().event("error").data(sse_data(&e.to_string()))),
            Err(e) => {
                tracing::error!("❌ Streaming generation failed: {}", e);
                Event::default().event("error").data(sse_data(&e.to_string()))
            }
        };
        let _ = tx.send(event);
    });

    Ok(Sse::new(UnboundedReceiverStream::new(rx).map(Ok)).keep_alive(KeepAlive::default()))
}

/// SSE data may not carry carriage returns.
fn sse_data(text: &str) -> String { text.replace('\r', "") }

pub async fn generate_once(
    State(state): State<AppState>,
    Json(params): Json<GenerationParameters>,
) -> Result<Json<RecordView>, StudioError> {
    let record = state.studio.generate_once(params).await?;
    Ok(Json(record.into()))
}

pub async fn list_history(State(state): State<AppState>) -> Json<Vec<HistoryRecord>> {
    Json(state.studio.history())
}

pub async fn clear_history(State(state): State<AppState>) -> Result<StatusCode, StudioError> {
    state.studio.clear_history()?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_record(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<RecordView>, StudioError> {
    Ok(Json(state.studio.record(id)?.into()))
}

pub async fn edit_chunk(
    Path((id, chunk_id)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
    Json(body): Json<EditChunkRequest>,
) -> Result<Json<RecordView>, StudioError> {
    Ok(Json(state.studio.edit_chunk(id, chunk_id, &body.body)?.into()))
}

/// Accepts an in-progress edit; it is committed once edits for this chunk
/// go quiet.
pub async fn draft_chunk(
    Path((id, chunk_id)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
    Json(body): Json<EditChunkRequest>,
) -> Result<StatusCode, StudioError> {
    let record = state.studio.record(id)?;
    if chunk_id >= chunker::chunk(&record.raw_text).len() {
        return Err(StudioError::ChunkNotFound { record_id: id, chunk_id });
    }
    state.autosave.schedule(state.studio.clone(), id, chunk_id, body.body);
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete_chunk(
    Path((id, chunk_id)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
) -> Result<Json<RecordView>, StudioError> {
    Ok(Json(state.studio.delete_chunk(id, chunk_id)?.into()))
}

pub async fn regenerate_chunk(
    Path((id, chunk_id)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
) -> Result<Json<RecordView>, StudioError> {
    Ok(Json(state.studio.regenerate_chunk(id, chunk_id).await?.into()))
}

pub async fn export_record(
    Path((id, format)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<Response, StudioError> {
    let format = ExportFormat::from_extension(&format)
        .ok_or_else(|| StudioError::InvalidParameters(format!("unsupported export format '{format}'")))?;
    let record = state.studio.record(id)?;
    let bytes = export(&record, format).map_err(StudioError::Export)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    let disposition = format!("attachment; filename=\"copy_{}.{}\"", id, format.extension());
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    tracing::info!("📄 Exported record {} as {}", id, format.extension());
    Ok((StatusCode::OK, headers, bytes).into_response())
}

pub async fn get_preferences(State(state): State<AppState>) -> Json<Preferences> {
    Json(state.studio.preferences())
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<Preferences>, StudioError> {
    Ok(Json(state.studio.update_preferences(update)?))
}
