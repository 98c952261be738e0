use chrono::Utc;
use shared::{
    domain::{GroupId, GroupLayout, GroupView, ImageId, ImageRecord, LayoutKind, ProjectId},
    protocol::Direction,
};
use tracing::{debug, info, warn};

use crate::{
    grouping::group_images,
    lifecycle::{
        blob_path, plan_batch_rows, plan_layout_change, validate_group_layout,
        LayoutChange, UploadBatch,
    },
    reorder::{plan_group_move, plan_member_move, ReorderPlan},
    BlobStore, GalleryError, GalleryResult, ImagePatch, ImageStore,
};

pub const MEDIA_PREFIX: &str = "project-images";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub image_ids: Vec<ImageId>,
    pub group_id: Option<GroupId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderOutcome {
    pub project_id: ProjectId,
    pub updated_rows: usize,
}

impl ReorderOutcome {
    pub fn changed(&self) -> bool {
        self.updated_rows > 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub project_id: Option<ProjectId>,
    pub deleted_rows: u64,
    pub media_removed: usize,
    pub media_failed: usize,
}

/// Gallery operations over a row store and a blob store.
#[derive(Clone)]
pub struct Gallery<S: ImageStore, B: BlobStore> {
    store: S,
    blobs: B,
}

impl<S: ImageStore, B: BlobStore> Gallery<S, B> {
    pub fn new(store: S, blobs: B) -> Self {
        Self { store, blobs }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub async fn groups(&self, project_id: ProjectId) -> GalleryResult<Vec<GroupView>> {
        let images = self.project_images(project_id).await?;
        Ok(group_images(&images))
    }

    /// Groups as the public site sees them: hidden rows are dropped before
    /// grouping, so a group with every member hidden disappears entirely.
    pub async fn active_groups(&self, project_id: ProjectId) -> GalleryResult<Vec<GroupView>> {
        let mut images = self.project_images(project_id).await?;
        images.retain(|image| image.is_active);
        Ok(group_images(&images))
    }

    pub async fn image(&self, image_id: ImageId) -> GalleryResult<ImageRecord> {
        self.store
            .get_image(image_id)
            .await
            .map_err(GalleryError::Store)?
            .ok_or_else(|| GalleryError::NotFound(format!("image {image_id}")))
    }

    pub async fn upload_batch(&self, batch: UploadBatch) -> GalleryResult<UploadOutcome> {
        batch.validate()?;
        let existing = self.project_images(batch.project_id).await?;

        let timestamp = Utc::now().timestamp_millis();
        let mut uploaded: Vec<String> = Vec::with_capacity(batch.files.len());
        for (sequence, file) in batch.files.iter().enumerate() {
            let path = blob_path(
                MEDIA_PREFIX,
                batch.project_id,
                timestamp,
                sequence,
                &file.file_name,
            );
            if let Err(error) = self
                .blobs
                .upload(&path, &file.bytes, file.content_type.as_deref())
                .await
            {
                self.discard_blobs(&uploaded).await;
                return Err(GalleryError::Blob(error));
            }
            uploaded.push(path);
        }

        let urls = uploaded
            .iter()
            .map(|path| self.blobs.public_url(path))
            .collect();
        let (group_id, rows) = plan_batch_rows(&existing, &batch, urls);
        let image_ids = match self.store.insert_images(&rows).await {
            Ok(ids) => ids,
            Err(error) => {
                self.discard_blobs(&uploaded).await;
                return Err(GalleryError::Store(error));
            }
        };

        info!(
            project_id = %batch.project_id,
            count = image_ids.len(),
            layout = batch.layout.layout_kind.as_str(),
            group_id = ?group_id,
            "uploaded image batch"
        );
        Ok(UploadOutcome {
            image_ids,
            group_id,
        })
    }

    pub async fn move_group(
        &self,
        anchor: ImageId,
        direction: Direction,
    ) -> GalleryResult<ReorderOutcome> {
        let image = self.image(anchor).await?;
        let images = self.project_images(image.project_id).await?;
        let plan = plan_group_move(&images, anchor, direction)?;
        self.apply_plan(image.project_id, plan).await
    }

    pub async fn move_within_group(
        &self,
        image_id: ImageId,
        direction: Direction,
    ) -> GalleryResult<ReorderOutcome> {
        let image = self.image(image_id).await?;
        let images = self.project_images(image.project_id).await?;
        let plan = plan_member_move(&images, image_id, direction)?;
        self.apply_plan(image.project_id, plan).await
    }

    /// Changes one image's layout kind: moving to solo detaches it from its
    /// group, moving a solo image to a grid kind starts a group of one, and
    /// a grouped image switching grid kind takes its whole group along.
    pub async fn change_layout_kind(
        &self,
        image_id: ImageId,
        kind: LayoutKind,
    ) -> GalleryResult<LayoutChange> {
        let image = self.image(image_id).await?;
        let change = plan_layout_change(&image, kind);
        match change {
            LayoutChange::Unchanged => {}
            LayoutChange::Dissolve => {
                let layout = GroupLayout {
                    layout_kind: LayoutKind::Solo,
                    ..image.layout.clone()
                };
                self.store
                    .set_image_grouping(image_id, None, &layout)
                    .await
                    .map_err(GalleryError::Store)?;
            }
            LayoutChange::NewGroup(group_id) => {
                let layout = GroupLayout {
                    layout_kind: kind,
                    ..image.layout.clone()
                };
                self.store
                    .set_image_grouping(image_id, Some(group_id), &layout)
                    .await
                    .map_err(GalleryError::Store)?;
            }
            LayoutChange::GroupEdit(group_id) => {
                let layout = GroupLayout {
                    layout_kind: kind,
                    ..image.layout.clone()
                };
                self.store
                    .update_group_layout(group_id, &layout)
                    .await
                    .map_err(GalleryError::Store)?;
            }
        }
        debug!(%image_id, kind = kind.as_str(), ?change, "changed image layout");
        Ok(change)
    }

    pub async fn update_image(
        &self,
        image_id: ImageId,
        patch: &ImagePatch,
    ) -> GalleryResult<ImageRecord> {
        patch.validate()?;
        if !patch.is_empty() {
            let found = self
                .store
                .update_image(image_id, patch)
                .await
                .map_err(GalleryError::Store)?;
            if !found {
                return Err(GalleryError::NotFound(format!("image {image_id}")));
            }
        }
        self.image(image_id).await
    }

    /// Applies shared layout attributes to every member of the group.
    pub async fn update_group_layout(
        &self,
        group_id: GroupId,
        layout: &GroupLayout,
    ) -> GalleryResult<ProjectId> {
        validate_group_layout(layout)?;
        let project_id = self.group_project(group_id).await?;
        let updated = self
            .store
            .update_group_layout(group_id, layout)
            .await
            .map_err(GalleryError::Store)?;
        info!(%group_id, updated, layout = layout.layout_kind.as_str(), "updated group layout");
        Ok(project_id)
    }

    /// Every member becomes solo in place; indices are untouched.
    pub async fn dissolve_group(&self, group_id: GroupId) -> GalleryResult<ProjectId> {
        let project_id = self.group_project(group_id).await?;
        let cleared = self
            .store
            .clear_group(group_id)
            .await
            .map_err(GalleryError::Store)?;
        info!(%group_id, cleared, "dissolved group");
        Ok(project_id)
    }

    pub async fn delete_image(&self, image_id: ImageId) -> GalleryResult<DeleteOutcome> {
        let image = self.image(image_id).await?;
        self.delete_rows(vec![image]).await
    }

    /// Removes every member's media (best effort) and then the rows, in a
    /// single multi-row delete.
    pub async fn delete_group(&self, group_id: GroupId) -> GalleryResult<DeleteOutcome> {
        let members = self
            .store
            .list_group_members(group_id)
            .await
            .map_err(GalleryError::Store)?;
        if members.is_empty() {
            return Err(GalleryError::NotFound(format!("group {group_id}")));
        }
        let outcome = self.delete_rows(members).await?;
        info!(
            %group_id,
            deleted = outcome.deleted_rows,
            media_failed = outcome.media_failed,
            "deleted group"
        );
        Ok(outcome)
    }

    async fn delete_rows(&self, rows: Vec<ImageRecord>) -> GalleryResult<DeleteOutcome> {
        let mut outcome = DeleteOutcome {
            project_id: rows.first().map(|row| row.project_id),
            ..DeleteOutcome::default()
        };

        for row in &rows {
            let Some(path) = self.blobs.path_from_public_url(&row.image_url) else {
                warn!(image_id = %row.id, url = %row.image_url, "image url does not map to a stored object");
                outcome.media_failed += 1;
                continue;
            };
            match self.blobs.remove(&path).await {
                Ok(()) => outcome.media_removed += 1,
                Err(error) => {
                    warn!(image_id = %row.id, %path, error = %error, "failed to remove image media");
                    outcome.media_failed += 1;
                }
            }
        }

        let ids: Vec<ImageId> = rows.iter().map(|row| row.id).collect();
        outcome.deleted_rows = self
            .store
            .delete_images(&ids)
            .await
            .map_err(GalleryError::Store)?;
        Ok(outcome)
    }

    async fn apply_plan(
        &self,
        project_id: ProjectId,
        plan: ReorderPlan,
    ) -> GalleryResult<ReorderOutcome> {
        if !plan.is_noop() {
            self.store
                .apply_order_updates(&plan.updates)
                .await
                .map_err(GalleryError::Store)?;
        }
        debug!(%project_id, updated = plan.updates.len(), "applied reorder");
        Ok(ReorderOutcome {
            project_id,
            updated_rows: plan.updates.len(),
        })
    }

    async fn group_project(&self, group_id: GroupId) -> GalleryResult<ProjectId> {
        self.store
            .list_group_members(group_id)
            .await
            .map_err(GalleryError::Store)?
            .first()
            .map(|member| member.project_id)
            .ok_or_else(|| GalleryError::NotFound(format!("group {group_id}")))
    }

    async fn project_images(&self, project_id: ProjectId) -> GalleryResult<Vec<ImageRecord>> {
        self.store
            .list_images(project_id)
            .await
            .map_err(GalleryError::Store)
    }

    async fn discard_blobs(&self, paths: &[String]) {
        for path in paths {
            if let Err(error) = self.blobs.remove(path).await {
                warn!(%path, error = %error, "failed to discard uploaded media");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
