use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gallery::{ImagePatch, ImageStore, OrderUpdate};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{
    DominantSide, FitMode, GroupId, GroupLayout, ImageId, ImageRecord, LayoutKind, NewImage,
    Project, ProjectId,
};

mod blob;

pub use blob::LocalBlobStore;

const IMAGE_COLUMNS: &str = "id, project_id, image_url, alt_text_primary, alt_text_secondary, order_index, is_active, group_id, layout_kind, aspect_ratio, fit_mode, padding, dominant_side, created_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_project(
        &self,
        slug: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<ProjectId> {
        let rec = sqlx::query(
            "INSERT INTO projects (slug, title, description) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(slug)
        .bind(title)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to create project '{slug}'"))?;
        Ok(ProjectId(rec.get::<i64, _>(0)))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT id, slug, title, description, is_active, created_at
             FROM projects
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(project_from_row).collect())
    }

    pub async fn get_project(&self, project_id: ProjectId) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, slug, title, description, is_active, created_at FROM projects WHERE id = ?",
        )
        .bind(project_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    pub async fn project_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, slug, title, description, is_active, created_at FROM projects WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    pub async fn set_project_active(&self, project_id: ProjectId, is_active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE projects SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(project_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ImageStore for Storage {
    async fn list_images(&self, project_id: ProjectId) -> Result<Vec<ImageRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {IMAGE_COLUMNS} FROM project_images WHERE project_id = ? ORDER BY order_index ASC, id ASC"
        ))
        .bind(project_id.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to list project images")?;
        rows.iter().map(image_from_row).collect()
    }

    async fn get_image(&self, image_id: ImageId) -> Result<Option<ImageRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {IMAGE_COLUMNS} FROM project_images WHERE id = ?"
        ))
        .bind(image_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(image_from_row).transpose()
    }

    async fn list_group_members(&self, group_id: GroupId) -> Result<Vec<ImageRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {IMAGE_COLUMNS} FROM project_images WHERE group_id = ? ORDER BY order_index ASC, id ASC"
        ))
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(image_from_row).collect()
    }

    async fn insert_images(&self, images: &[NewImage]) -> Result<Vec<ImageId>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(images.len());
        for image in images {
            let rec = sqlx::query(
                "INSERT INTO project_images (
                    project_id, image_url, alt_text_primary, alt_text_secondary, order_index,
                    is_active, group_id, layout_kind, aspect_ratio, fit_mode, padding, dominant_side
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(image.project_id.0)
            .bind(&image.image_url)
            .bind(&image.alt_text_primary)
            .bind(image.alt_text_secondary.as_deref())
            .bind(image.order_index)
            .bind(image.is_active)
            .bind(image.group_id.map(|group_id| group_id.to_string()))
            .bind(image.layout.layout_kind.as_str())
            .bind(image.layout.aspect_ratio.as_deref())
            .bind(image.layout.fit_mode.as_str())
            .bind(i64::from(image.layout.padding))
            .bind(image.layout.dominant_side.as_str())
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("failed to insert image for project {}", image.project_id))?;
            ids.push(ImageId(rec.get::<i64, _>(0)));
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn apply_order_updates(&self, updates: &[OrderUpdate]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for update in updates {
            let result = sqlx::query("UPDATE project_images SET order_index = ? WHERE id = ?")
                .bind(update.order_index)
                .bind(update.image_id.0)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(anyhow!(
                    "image {} disappeared during reorder",
                    update.image_id
                ));
            }
        }
        tx.commit().await.context("failed to commit reorder")?;
        Ok(())
    }

    async fn update_image(&self, image_id: ImageId, patch: &ImagePatch) -> Result<bool> {
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE project_images SET ");
        let mut columns = query.separated(", ");
        if let Some(alt) = &patch.alt_text_primary {
            columns.push("alt_text_primary = ").push_bind_unseparated(alt.clone());
        }
        if let Some(alt) = &patch.alt_text_secondary {
            columns
                .push("alt_text_secondary = ")
                .push_bind_unseparated(alt.clone());
        }
        if let Some(active) = patch.is_active {
            columns.push("is_active = ").push_bind_unseparated(active);
        }
        if patch.is_empty() {
            columns.push("id = id");
        }
        query.push(" WHERE id = ").push_bind(image_id.0);

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_image_grouping(
        &self,
        image_id: ImageId,
        group_id: Option<GroupId>,
        layout: &GroupLayout,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE project_images
             SET group_id = ?, layout_kind = ?, aspect_ratio = ?, fit_mode = ?, padding = ?, dominant_side = ?
             WHERE id = ?",
        )
        .bind(group_id.map(|group_id| group_id.to_string()))
        .bind(layout.layout_kind.as_str())
        .bind(layout.aspect_ratio.as_deref())
        .bind(layout.fit_mode.as_str())
        .bind(i64::from(layout.padding))
        .bind(layout.dominant_side.as_str())
        .bind(image_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_group_layout(&self, group_id: GroupId, layout: &GroupLayout) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE project_images
             SET layout_kind = ?, aspect_ratio = ?, fit_mode = ?, padding = ?, dominant_side = ?
             WHERE group_id = ?",
        )
        .bind(layout.layout_kind.as_str())
        .bind(layout.aspect_ratio.as_deref())
        .bind(layout.fit_mode.as_str())
        .bind(i64::from(layout.padding))
        .bind(layout.dominant_side.as_str())
        .bind(group_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn clear_group(&self, group_id: GroupId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE project_images SET group_id = NULL, layout_kind = 'solo' WHERE group_id = ?",
        )
        .bind(group_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_images(&self, image_ids: &[ImageId]) -> Result<u64> {
        if image_ids.is_empty() {
            return Ok(0);
        }
        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM project_images WHERE id IN (");
        let mut ids = query.separated(", ");
        for image_id in image_ids {
            ids.push_bind(image_id.0);
        }
        ids.push_unseparated(")");

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn project_from_row(r: &SqliteRow) -> Project {
    Project {
        id: ProjectId(r.get::<i64, _>("id")),
        slug: r.get::<String, _>("slug"),
        title: r.get::<String, _>("title"),
        description: r.get::<Option<String>, _>("description"),
        is_active: r.get::<bool, _>("is_active"),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    }
}

fn image_from_row(r: &SqliteRow) -> Result<ImageRecord> {
    let group_id = match r.get::<Option<String>, _>("group_id") {
        Some(raw) => Some(
            GroupId::parse(&raw).ok_or_else(|| anyhow!("malformed group id '{raw}' in store"))?,
        ),
        None => None,
    };
    let layout_kind: String = r.get("layout_kind");
    let fit_mode: String = r.get("fit_mode");
    let dominant_side: String = r.get("dominant_side");

    Ok(ImageRecord {
        id: ImageId(r.get::<i64, _>("id")),
        project_id: ProjectId(r.get::<i64, _>("project_id")),
        image_url: r.get::<String, _>("image_url"),
        alt_text_primary: r.get::<String, _>("alt_text_primary"),
        alt_text_secondary: r.get::<Option<String>, _>("alt_text_secondary"),
        order_index: r.get::<i64, _>("order_index"),
        is_active: r.get::<bool, _>("is_active"),
        group_id,
        layout: GroupLayout {
            layout_kind: LayoutKind::parse(&layout_kind).unwrap_or_default(),
            aspect_ratio: r.get::<Option<String>, _>("aspect_ratio"),
            fit_mode: FitMode::parse(&fit_mode).unwrap_or_default(),
            padding: u32::try_from(r.get::<i64, _>("padding")).unwrap_or_default(),
            dominant_side: DominantSide::parse(&dominant_side).unwrap_or_default(),
        },
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
