use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use gallery::{UploadBatch, UploadFile};
use serde::Deserialize;
use server_api::{
    bust_cache, create_project, delete_group, delete_image, dissolve_group, list_groups,
    list_projects, media_bytes, move_group, move_within_group, patch_image, public_gallery,
    set_project_active, update_group_layout, upload_images, ApiContext, ContentCache,
    SessionKeys,
};
use shared::{
    domain::{
        DominantSide, FitMode, GroupId, GroupLayout, GroupView, ImageId, ImageRecord,
        LayoutKind, Project, ProjectId,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        CreateProjectRequest, DeleteResponse, GalleryPayload, GroupLayoutRequest,
        ImagePatchRequest, MoveRequest, ProjectPatchRequest, ReorderResponse,
        UploadBatchResponse,
    },
};
use storage::{LocalBlobStore, Storage};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::{AdminSession, AppState};
use config::{load_settings, prepare_database_url, Settings};

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Default, Deserialize)]
struct UploadQuery {
    layout: Option<String>,
    alt_text: Option<String>,
    alt_text_secondary: Option<String>,
    aspect_ratio: Option<String>,
    fit_mode: Option<String>,
    padding: Option<u32>,
    dominant_side: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let state = build_state(&settings).await?;
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let blobs = LocalBlobStore::new(&settings.media_root, &settings.media_public_base)?;
    let cache = ContentCache::new(
        Duration::from_secs(settings.cache_ttl_seconds),
        settings.cache_max_entries,
        settings.cache_max_media_bytes,
    );
    let sessions = SessionKeys::new(&settings.auth_jwt_secret, settings.session_ttl_seconds)?;
    if settings.auth_jwt_secret == "devsecret" {
        warn!("using the development session secret; set APP__AUTH_JWT_SECRET");
    }

    Ok(AppState {
        api: ApiContext::new(storage, blobs, cache),
        sessions,
        max_upload_bytes: settings.max_upload_bytes,
    })
}

fn build_router(state: Arc<AppState>) -> Router {
    let uploads = Router::new()
        .route("/admin/projects/:project_id/images", post(http_upload_images))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.max_upload_bytes));

    let admin = Router::new()
        .route("/admin/projects", post(http_create_project).get(http_list_projects))
        .route("/admin/projects/:project_id", patch(http_patch_project))
        .route("/admin/projects/:project_id/groups", get(http_list_groups))
        .route("/admin/images/:image_id", patch(http_patch_image).delete(http_delete_image))
        .route("/admin/images/:image_id/move", post(http_move_group))
        .route(
            "/admin/images/:image_id/move_within_group",
            post(http_move_within_group),
        )
        .route("/admin/groups/:group_id", delete(http_delete_group))
        .route("/admin/groups/:group_id/layout", put(http_update_group_layout))
        .route("/admin/groups/:group_id/dissolve", post(http_dissolve_group))
        .route("/admin/cache/bust", post(http_bust_cache))
        .merge(uploads)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/public/projects/:slug/gallery", get(http_public_gallery))
        .route("/media/*path", get(http_media))
        .merge(admin)
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

fn parse_group_id(raw: &str) -> Result<GroupId, HttpError> {
    GroupId::parse(raw).ok_or_else(|| reject(ApiError::validation("invalid group id")))
}

async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let subject = state
        .sessions
        .verify_bearer(header)
        .map_err(|error| reject(error.into()))?;
    request.extensions_mut().insert(AdminSession(subject));
    Ok(next.run(request).await)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, "storage unavailable")),
        )
    })?;
    Ok("ok")
}

async fn http_create_project(
    State(state): State<Arc<AppState>>,
    axum::Extension(session): axum::Extension<AdminSession>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), HttpError> {
    let project = create_project(&state.api, &req).await.map_err(reject)?;
    info!(admin = %session.0, project_id = %project.id, "project created via api");
    Ok((StatusCode::CREATED, Json(project)))
}

async fn http_list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Project>>, HttpError> {
    Ok(Json(list_projects(&state.api).await.map_err(reject)?))
}

async fn http_patch_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    Json(req): Json<ProjectPatchRequest>,
) -> Result<Json<Project>, HttpError> {
    let project = set_project_active(&state.api, ProjectId(project_id), req.is_active)
        .await
        .map_err(reject)?;
    Ok(Json(project))
}

async fn http_list_groups(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<GroupView>>, HttpError> {
    let groups = list_groups(&state.api, ProjectId(project_id))
        .await
        .map_err(reject)?;
    Ok(Json(groups))
}

async fn http_upload_images(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    Query(q): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadBatchResponse>), HttpError> {
    let layout = upload_layout(&q)?;
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        files.push(UploadFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    let batch = UploadBatch {
        project_id: ProjectId(project_id),
        layout,
        alt_text_primary: q.alt_text.filter(|alt| !alt.trim().is_empty()),
        alt_text_secondary: q.alt_text_secondary.filter(|alt| !alt.trim().is_empty()),
        files,
    };
    let response = upload_images(&state.api, batch).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(response)))
}

fn upload_layout(q: &UploadQuery) -> Result<GroupLayout, HttpError> {
    let invalid =
        |what: &str, raw: &str| reject(ApiError::validation(format!("invalid {what} '{raw}'")));

    let layout_kind = match q.layout.as_deref() {
        Some(raw) => LayoutKind::parse(raw).ok_or_else(|| invalid("layout", raw))?,
        None => LayoutKind::Solo,
    };
    let fit_mode = match q.fit_mode.as_deref() {
        Some(raw) => FitMode::parse(raw).ok_or_else(|| invalid("fit mode", raw))?,
        None => FitMode::default(),
    };
    let dominant_side = match q.dominant_side.as_deref() {
        Some(raw) => DominantSide::parse(raw).ok_or_else(|| invalid("dominant side", raw))?,
        None => DominantSide::default(),
    };
    Ok(GroupLayout {
        layout_kind,
        aspect_ratio: q
            .aspect_ratio
            .clone()
            .filter(|ratio| !ratio.trim().is_empty()),
        fit_mode,
        padding: q.padding.unwrap_or_default(),
        dominant_side,
    })
}

fn multipart_error(error: axum::extract::multipart::MultipartError) -> HttpError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return reject(ApiError::new(
            ErrorCode::PayloadTooLarge,
            "upload exceeds the size limit",
        ));
    }
    reject(ApiError::validation(format!("malformed upload: {}", error.body_text())))
}

async fn http_move_group(
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<i64>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<ReorderResponse>, HttpError> {
    let response = move_group(&state.api, ImageId(image_id), req.direction)
        .await
        .map_err(reject)?;
    Ok(Json(response))
}

async fn http_move_within_group(
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<i64>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<ReorderResponse>, HttpError> {
    let response = move_within_group(&state.api, ImageId(image_id), req.direction)
        .await
        .map_err(reject)?;
    Ok(Json(response))
}

async fn http_patch_image(
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<i64>,
    Json(req): Json<ImagePatchRequest>,
) -> Result<Json<ImageRecord>, HttpError> {
    let image = patch_image(&state.api, ImageId(image_id), req)
        .await
        .map_err(reject)?;
    Ok(Json(image))
}

async fn http_delete_image(
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<i64>,
) -> Result<Json<DeleteResponse>, HttpError> {
    let response = delete_image(&state.api, ImageId(image_id))
        .await
        .map_err(reject)?;
    Ok(Json(response))
}

async fn http_update_group_layout(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Json(req): Json<GroupLayoutRequest>,
) -> Result<StatusCode, HttpError> {
    let group_id = parse_group_id(&group_id)?;
    update_group_layout(&state.api, group_id, req.into())
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_dissolve_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Result<StatusCode, HttpError> {
    let group_id = parse_group_id(&group_id)?;
    dissolve_group(&state.api, group_id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_delete_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Result<Json<DeleteResponse>, HttpError> {
    let group_id = parse_group_id(&group_id)?;
    let response = delete_group(&state.api, group_id).await.map_err(reject)?;
    Ok(Json(response))
}

async fn http_bust_cache(
    State(state): State<Arc<AppState>>,
    axum::Extension(session): axum::Extension<AdminSession>,
) -> StatusCode {
    info!(admin = %session.0, "manual cache bust");
    bust_cache(&state.api);
    StatusCode::NO_CONTENT
}

async fn http_public_gallery(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<GalleryPayload>, HttpError> {
    let payload = public_gallery(&state.api, &slug).await.map_err(reject)?;
    Ok(Json(payload.as_ref().clone()))
}

async fn http_media(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let bytes = media_bytes(&state.api, &path).await.map_err(reject)?;
    let content_type = HeaderValue::from_static(content_type_for(&path));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        bytes.as_ref().clone(),
    ))
}

fn content_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
