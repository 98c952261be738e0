use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::domain::{
    GroupId, GroupLayout, GroupView, ImageId, ImageRecord, LayoutKind, NewImage, ProjectId,
};
use tokio::sync::Mutex;

use crate::{BlobStore, ImagePatch, ImageStore, OrderUpdate, ReorderPlan};

pub(crate) const PROJECT: ProjectId = ProjectId(1);
pub(crate) const MEDIA_BASE: &str = "https://media.test/public";

pub(crate) fn solo(id: i64, order_index: i64) -> ImageRecord {
    record(id, order_index, None, LayoutKind::Solo)
}

pub(crate) fn member(id: i64, order_index: i64, group_id: GroupId, kind: LayoutKind) -> ImageRecord {
    record(id, order_index, Some(group_id), kind)
}

pub(crate) fn record(
    id: i64,
    order_index: i64,
    group_id: Option<GroupId>,
    kind: LayoutKind,
) -> ImageRecord {
    ImageRecord {
        id: ImageId(id),
        project_id: PROJECT,
        image_url: format!("{MEDIA_BASE}/project-images/1/{id}.jpg"),
        alt_text_primary: format!("image {id}"),
        alt_text_secondary: None,
        order_index,
        is_active: true,
        group_id,
        layout: GroupLayout::with_kind(kind),
        created_at: Utc::now(),
    }
}

/// Image ids in display order, group members inline.
pub(crate) fn flatten_ids(groups: &[GroupView]) -> Vec<ImageId> {
    groups
        .iter()
        .flat_map(|group| group.members.iter().map(|member| member.id))
        .collect()
}

/// Writes a plan's indices onto in-memory rows.
pub(crate) fn apply_plan(plan: &ReorderPlan, images: &mut [ImageRecord]) {
    for update in &plan.updates {
        if let Some(image) = images.iter_mut().find(|image| image.id == update.image_id) {
            image.order_index = update.order_index;
        }
    }
}

#[derive(Default, Clone)]
pub(crate) struct MemoryStore {
    pub(crate) rows: Arc<Mutex<Vec<ImageRecord>>>,
    pub(crate) delete_calls: Arc<Mutex<Vec<Vec<ImageId>>>>,
    pub(crate) order_batches: Arc<Mutex<usize>>,
    pub(crate) fail_inserts: bool,
}

impl MemoryStore {
    pub(crate) fn with_rows(rows: Vec<ImageRecord>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            ..Self::default()
        }
    }

    pub(crate) async fn snapshot(&self) -> Vec<ImageRecord> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn list_images(&self, project_id: ProjectId) -> Result<Vec<ImageRecord>> {
        let mut rows: Vec<ImageRecord> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.project_id == project_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.order_index, row.id));
        Ok(rows)
    }

    async fn get_image(&self, image_id: ImageId) -> Result<Option<ImageRecord>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|row| row.id == image_id)
            .cloned())
    }

    async fn list_group_members(&self, group_id: GroupId) -> Result<Vec<ImageRecord>> {
        let mut rows: Vec<ImageRecord> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.group_id == Some(group_id))
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.order_index, row.id));
        Ok(rows)
    }

    async fn insert_images(&self, images: &[NewImage]) -> Result<Vec<ImageId>> {
        if self.fail_inserts {
            return Err(anyhow!("insert rejected"));
        }
        let mut rows = self.rows.lock().await;
        let mut next = rows.iter().map(|row| row.id.0).max().unwrap_or(0) + 1;
        let mut ids = Vec::new();
        for image in images {
            let id = ImageId(next);
            next += 1;
            rows.push(ImageRecord {
                id,
                project_id: image.project_id,
                image_url: image.image_url.clone(),
                alt_text_primary: image.alt_text_primary.clone(),
                alt_text_secondary: image.alt_text_secondary.clone(),
                order_index: image.order_index,
                is_active: image.is_active,
                group_id: image.group_id,
                layout: image.layout.clone(),
                created_at: Utc::now(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn apply_order_updates(&self, updates: &[OrderUpdate]) -> Result<()> {
        let mut rows = self.rows.lock().await;
        for update in updates {
            if let Some(row) = rows.iter_mut().find(|row| row.id == update.image_id) {
                row.order_index = update.order_index;
            }
        }
        *self.order_batches.lock().await += 1;
        Ok(())
    }

    async fn update_image(&self, image_id: ImageId, patch: &ImagePatch) -> Result<bool> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows.iter_mut().find(|row| row.id == image_id) else {
            return Ok(false);
        };
        if let Some(alt) = &patch.alt_text_primary {
            row.alt_text_primary = alt.clone();
        }
        if let Some(alt) = &patch.alt_text_secondary {
            row.alt_text_secondary = alt.clone();
        }
        if let Some(active) = patch.is_active {
            row.is_active = active;
        }
        Ok(true)
    }

    async fn set_image_grouping(
        &self,
        image_id: ImageId,
        group_id: Option<GroupId>,
        layout: &GroupLayout,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|row| row.id == image_id) {
            row.group_id = group_id;
            row.layout = layout.clone();
        }
        Ok(())
    }

    async fn update_group_layout(&self, group_id: GroupId, layout: &GroupLayout) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let mut updated = 0;
        for row in rows.iter_mut().filter(|row| row.group_id == Some(group_id)) {
            row.layout = layout.clone();
            updated += 1;
        }
        Ok(updated)
    }

    async fn clear_group(&self, group_id: GroupId) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let mut cleared = 0;
        for row in rows.iter_mut().filter(|row| row.group_id == Some(group_id)) {
            row.group_id = None;
            row.layout.layout_kind = LayoutKind::Solo;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn delete_images(&self, image_ids: &[ImageId]) -> Result<u64> {
        self.delete_calls.lock().await.push(image_ids.to_vec());
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| !image_ids.contains(&row.id));
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default, Clone)]
pub(crate) struct MemoryBlobs {
    pub(crate) objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub(crate) removed: Arc<Mutex<Vec<String>>>,
    pub(crate) failing_paths: Arc<Mutex<HashSet<String>>>,
    pub(crate) fail_uploads_after: Option<usize>,
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn upload(&self, path: &str, bytes: &[u8], _content_type: Option<&str>) -> Result<()> {
        let mut objects = self.objects.lock().await;
        if self
            .fail_uploads_after
            .is_some_and(|limit| objects.len() >= limit)
        {
            return Err(anyhow!("bucket full"));
        }
        objects.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.removed.lock().await.push(path.to_string());
        if self.failing_paths.lock().await.contains(path) {
            return Err(anyhow!("remove refused for {path}"));
        }
        self.objects.lock().await.remove(path);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().await.get(path).cloned())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{MEDIA_BASE}/{path}")
    }

    fn path_from_public_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(MEDIA_BASE)
            .map(|rest| rest.trim_start_matches('/').to_string())
            .filter(|path| !path.is_empty())
    }
}
