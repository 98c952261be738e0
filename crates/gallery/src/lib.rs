//! Project gallery core: grouping of image rows into grid clusters, reorder
//! planning, and the group lifecycle, expressed over a row store and a blob
//! store supplied by the caller.

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{GroupId, GroupLayout, ImageId, ImageRecord, NewImage, ProjectId};
use thiserror::Error;

pub mod grouping;
pub mod lifecycle;
pub mod reorder;
pub mod service;

pub use grouping::group_images;
pub use lifecycle::{LayoutChange, UploadBatch, UploadFile};
pub use reorder::{plan_group_move, plan_member_move, OrderUpdate, ReorderPlan};
pub use service::{DeleteOutcome, Gallery, ReorderOutcome, UploadOutcome};

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("store operation failed: {0:#}")]
    Store(anyhow::Error),
    #[error("media storage failed: {0:#}")]
    Blob(anyhow::Error),
}

pub type GalleryResult<T> = std::result::Result<T, GalleryError>;

/// Per-row edit. `None` leaves a column untouched; `alt_text_secondary:
/// Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagePatch {
    pub alt_text_primary: Option<String>,
    pub alt_text_secondary: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl ImagePatch {
    pub fn is_empty(&self) -> bool {
        self.alt_text_primary.is_none()
            && self.alt_text_secondary.is_none()
            && self.is_active.is_none()
    }

    /// Checks every field without touching a store.
    pub fn validate(&self) -> GalleryResult<()> {
        if let Some(alt) = &self.alt_text_primary {
            if alt.trim().is_empty() {
                return Err(GalleryError::Validation("alt text is required".into()));
            }
            lifecycle::validate_alt_text(alt)?;
        }
        if let Some(Some(alt)) = &self.alt_text_secondary {
            lifecycle::validate_alt_text(alt)?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Rows for a project ordered by `order_index`, then id.
    async fn list_images(&self, project_id: ProjectId) -> Result<Vec<ImageRecord>>;
    async fn get_image(&self, image_id: ImageId) -> Result<Option<ImageRecord>>;
    async fn list_group_members(&self, group_id: GroupId) -> Result<Vec<ImageRecord>>;
    async fn insert_images(&self, images: &[NewImage]) -> Result<Vec<ImageId>>;
    /// Applies every update or none of them.
    async fn apply_order_updates(&self, updates: &[OrderUpdate]) -> Result<()>;
    async fn update_image(&self, image_id: ImageId, patch: &ImagePatch) -> Result<bool>;
    async fn set_image_grouping(
        &self,
        image_id: ImageId,
        group_id: Option<GroupId>,
        layout: &GroupLayout,
    ) -> Result<()>;
    async fn update_group_layout(&self, group_id: GroupId, layout: &GroupLayout) -> Result<u64>;
    /// Turns every member of the group into a solo row.
    async fn clear_group(&self, group_id: GroupId) -> Result<u64>;
    async fn delete_images(&self, image_ids: &[ImageId]) -> Result<u64>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: &[u8], content_type: Option<&str>) -> Result<()>;
    async fn remove(&self, path: &str) -> Result<()>;
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;
    fn public_url(&self, path: &str) -> String;
    /// Inverse of [`BlobStore::public_url`]; `None` for URLs this store did not issue.
    fn path_from_public_url(&self, url: &str) -> Option<String>;
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
