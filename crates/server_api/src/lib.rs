use std::sync::Arc;

use gallery::{BlobStore, Gallery, GalleryError, ImagePatch, LayoutChange, UploadBatch};
use shared::{
    domain::{GroupId, GroupLayout, GroupView, ImageId, ImageRecord, Project, ProjectId},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateProjectRequest, DeleteResponse, Direction, GalleryPayload, ImagePatchRequest,
        ReorderResponse, UploadBatchResponse,
    },
};
use storage::{LocalBlobStore, Storage};
use tracing::{error, info};

pub mod auth;
pub mod cache;

pub use auth::{AuthError, SessionKeys};
pub use cache::ContentCache;

const MAX_SLUG_BYTES: usize = 80;
const MAX_TITLE_BYTES: usize = 200;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub gallery: Gallery<Storage, LocalBlobStore>,
    pub cache: ContentCache,
}

impl ApiContext {
    pub fn new(storage: Storage, blobs: LocalBlobStore, cache: ContentCache) -> Self {
        Self {
            gallery: Gallery::new(storage.clone(), blobs),
            storage,
            cache,
        }
    }
}

pub async fn create_project(
    ctx: &ApiContext,
    req: &CreateProjectRequest,
) -> Result<Project, ApiError> {
    let slug = req.slug.trim();
    validate_slug(slug)?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("title is required"));
    }
    if title.len() > MAX_TITLE_BYTES {
        return Err(ApiError::validation("title is too long"));
    }
    if ctx
        .storage
        .project_by_slug(slug)
        .await
        .map_err(internal)?
        .is_some()
    {
        return Err(ApiError::validation(format!("slug '{slug}' is already taken")));
    }

    let description = req
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());
    let project_id = ctx
        .storage
        .create_project(slug, title, description)
        .await
        .map_err(internal)?;
    info!(%project_id, %slug, "created project");
    require_project(ctx, project_id).await
}

pub async fn list_projects(ctx: &ApiContext) -> Result<Vec<Project>, ApiError> {
    ctx.storage.list_projects().await.map_err(internal)
}

pub async fn set_project_active(
    ctx: &ApiContext,
    project_id: ProjectId,
    is_active: bool,
) -> Result<Project, ApiError> {
    let updated = ctx
        .storage
        .set_project_active(project_id, is_active)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::not_found("project not found"));
    }
    let project = require_project(ctx, project_id).await?;
    ctx.cache.invalidate_gallery(&project.slug).await;
    Ok(project)
}

pub async fn list_groups(ctx: &ApiContext, project_id: ProjectId) -> Result<Vec<GroupView>, ApiError> {
    require_project(ctx, project_id).await?;
    ctx.gallery.groups(project_id).await.map_err(gallery_error)
}

pub async fn upload_images(
    ctx: &ApiContext,
    batch: UploadBatch,
) -> Result<UploadBatchResponse, ApiError> {
    let project = require_project(ctx, batch.project_id).await?;
    let outcome = ctx
        .gallery
        .upload_batch(batch)
        .await
        .map_err(gallery_error)?;
    ctx.cache.invalidate_gallery(&project.slug).await;
    Ok(UploadBatchResponse {
        image_ids: outcome.image_ids,
        group_id: outcome.group_id,
    })
}

pub async fn move_group(
    ctx: &ApiContext,
    image_id: ImageId,
    direction: Direction,
) -> Result<ReorderResponse, ApiError> {
    let outcome = ctx
        .gallery
        .move_group(image_id, direction)
        .await
        .map_err(gallery_error)?;
    if outcome.changed() {
        invalidate_project(ctx, outcome.project_id).await;
    }
    Ok(ReorderResponse {
        changed: outcome.changed(),
        updated_rows: outcome.updated_rows,
    })
}

pub async fn move_within_group(
    ctx: &ApiContext,
    image_id: ImageId,
    direction: Direction,
) -> Result<ReorderResponse, ApiError> {
    let outcome = ctx
        .gallery
        .move_within_group(image_id, direction)
        .await
        .map_err(gallery_error)?;
    if outcome.changed() {
        invalidate_project(ctx, outcome.project_id).await;
    }
    Ok(ReorderResponse {
        changed: outcome.changed(),
        updated_rows: outcome.updated_rows,
    })
}

/// Applies a per-image edit. The whole patch is validated before any write;
/// a layout kind change then runs first, so a request that both dissolves
/// an image and renames it sees the dissolved row.
pub async fn patch_image(
    ctx: &ApiContext,
    image_id: ImageId,
    req: ImagePatchRequest,
) -> Result<ImageRecord, ApiError> {
    let patch = ImagePatch {
        alt_text_primary: req.alt_text_primary.map(|alt| alt.trim().to_string()),
        alt_text_secondary: req
            .alt_text_secondary
            .map(|alt| Some(alt.trim().to_string()).filter(|alt| !alt.is_empty())),
        is_active: req.is_active,
    };
    patch.validate().map_err(gallery_error)?;

    let Some(kind) = req.layout_kind else {
        let image = ctx
            .gallery
            .update_image(image_id, &patch)
            .await
            .map_err(gallery_error)?;
        invalidate_project(ctx, image.project_id).await;
        return Ok(image);
    };

    let project_id = ctx
        .gallery
        .image(image_id)
        .await
        .map_err(gallery_error)?
        .project_id;
    let change = ctx
        .gallery
        .change_layout_kind(image_id, kind)
        .await
        .map_err(gallery_error)?;
    let updated = ctx.gallery.update_image(image_id, &patch).await;
    if updated.is_ok() || change != LayoutChange::Unchanged {
        invalidate_project(ctx, project_id).await;
    }
    updated.map_err(gallery_error)
}

pub async fn delete_image(ctx: &ApiContext, image_id: ImageId) -> Result<DeleteResponse, ApiError> {
    let outcome = ctx
        .gallery
        .delete_image(image_id)
        .await
        .map_err(gallery_error)?;
    if let Some(project_id) = outcome.project_id {
        invalidate_project(ctx, project_id).await;
    }
    ctx.cache.invalidate_media();
    Ok(DeleteResponse {
        deleted_rows: outcome.deleted_rows,
        media_removed: outcome.media_removed,
        media_failed: outcome.media_failed,
    })
}

pub async fn update_group_layout(
    ctx: &ApiContext,
    group_id: GroupId,
    layout: GroupLayout,
) -> Result<(), ApiError> {
    let project_id = ctx
        .gallery
        .update_group_layout(group_id, &layout)
        .await
        .map_err(gallery_error)?;
    invalidate_project(ctx, project_id).await;
    Ok(())
}

pub async fn dissolve_group(ctx: &ApiContext, group_id: GroupId) -> Result<(), ApiError> {
    let project_id = ctx
        .gallery
        .dissolve_group(group_id)
        .await
        .map_err(gallery_error)?;
    invalidate_project(ctx, project_id).await;
    Ok(())
}

pub async fn delete_group(ctx: &ApiContext, group_id: GroupId) -> Result<DeleteResponse, ApiError> {
    let outcome = ctx
        .gallery
        .delete_group(group_id)
        .await
        .map_err(gallery_error)?;
    if let Some(project_id) = outcome.project_id {
        invalidate_project(ctx, project_id).await;
    }
    ctx.cache.invalidate_media();
    Ok(DeleteResponse {
        deleted_rows: outcome.deleted_rows,
        media_removed: outcome.media_removed,
        media_failed: outcome.media_failed,
    })
}

/// Public read of an active project's visible images, served from the
/// content cache.
pub async fn public_gallery(
    ctx: &ApiContext,
    slug: &str,
) -> Result<Arc<GalleryPayload>, ApiError> {
    ctx.cache
        .gallery(slug, || async {
            let project = ctx
                .storage
                .project_by_slug(slug)
                .await
                .map_err(internal)?
                .filter(|project| project.is_active)
                .ok_or_else(|| ApiError::not_found("project not found"))?;
            let groups = ctx
                .gallery
                .active_groups(project.id)
                .await
                .map_err(gallery_error)?;
            Ok(GalleryPayload { project, groups })
        })
        .await
}

pub async fn media_bytes(
    ctx: &ApiContext,
    path: &str,
) -> Result<Arc<Vec<u8>>, ApiError> {
    if !LocalBlobStore::is_valid_object_path(path) {
        return Err(ApiError::validation("invalid media path"));
    }
    ctx.cache
        .media(path, || async {
            ctx.gallery.blobs().read(path).await.map_err(internal)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("media not found"))
}

pub fn bust_cache(ctx: &ApiContext) {
    ctx.cache.bust();
}

async fn require_project(ctx: &ApiContext, project_id: ProjectId) -> Result<Project, ApiError> {
    ctx.storage
        .get_project(project_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("project not found"))
}

async fn invalidate_project(ctx: &ApiContext, project_id: ProjectId) {
    match ctx.storage.get_project(project_id).await {
        Ok(Some(project)) => ctx.cache.invalidate_gallery(&project.slug).await,
        Ok(None) => {}
        Err(error) => {
            error!(%project_id, error = %error, "failed to resolve project for cache invalidation; busting cache");
            ctx.cache.bust();
        }
    }
}

fn validate_slug(slug: &str) -> Result<(), ApiError> {
    if slug.is_empty() {
        return Err(ApiError::validation("slug is required"));
    }
    if slug.len() > MAX_SLUG_BYTES {
        return Err(ApiError::validation("slug is too long"));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        || slug.starts_with('-')
        || slug.ends_with('-')
    {
        return Err(ApiError::validation(
            "slug may only contain lowercase letters, digits and inner dashes",
        ));
    }
    Ok(())
}

fn gallery_error(err: GalleryError) -> ApiError {
    match &err {
        GalleryError::Validation(message) => ApiError::validation(message.clone()),
        GalleryError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
        GalleryError::Store(_) | GalleryError::Blob(_) => {
            error!(error = %err, "gallery operation failed");
            ApiError::new(ErrorCode::Internal, "operation failed, try again")
        }
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    error!(error = %format!("{err:#}"), "store call failed");
    ApiError::new(ErrorCode::Internal, "operation failed, try again")
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
