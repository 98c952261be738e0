use shared::domain::{
    GroupId, GroupLayout, ImageRecord, LayoutKind, NewImage, ProjectId,
};

use crate::{GalleryError, GalleryResult};

pub const MAX_PADDING: u32 = 256;
pub const MAX_ALT_TEXT_BYTES: usize = 500;
const MAX_FILE_NAME_BYTES: usize = 120;

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// One upload action: every file shares the layout and, for grid layouts,
/// a freshly generated group id.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub project_id: ProjectId,
    pub layout: GroupLayout,
    pub alt_text_primary: Option<String>,
    pub alt_text_secondary: Option<String>,
    pub files: Vec<UploadFile>,
}

impl UploadBatch {
    pub fn validate(&self) -> GalleryResult<()> {
        if self.files.is_empty() {
            return Err(GalleryError::Validation("select at least one image".into()));
        }
        if let Some(file) = self.files.iter().find(|file| file.bytes.is_empty()) {
            return Err(GalleryError::Validation(format!(
                "file '{}' is empty",
                file.file_name
            )));
        }
        if let Some(alt) = &self.alt_text_primary {
            validate_alt_text(alt)?;
        }
        if let Some(alt) = &self.alt_text_secondary {
            validate_alt_text(alt)?;
        }
        validate_layout(&self.layout)
    }
}

/// What changing one image's layout kind amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutChange {
    Unchanged,
    /// Leave the group (if any) and become solo.
    Dissolve,
    /// A solo row becomes a group of one.
    NewGroup(GroupId),
    /// The row's whole group switches kind.
    GroupEdit(GroupId),
}

pub fn plan_layout_change(image: &ImageRecord, kind: LayoutKind) -> LayoutChange {
    match (image.group_id, kind.is_grid()) {
        (Some(_), false) => LayoutChange::Dissolve,
        (None, false) if image.layout.layout_kind != LayoutKind::Solo => LayoutChange::Dissolve,
        (None, false) => LayoutChange::Unchanged,
        (Some(group_id), true) if image.layout.layout_kind != kind => {
            LayoutChange::GroupEdit(group_id)
        }
        (Some(_), true) => LayoutChange::Unchanged,
        (None, true) => LayoutChange::NewGroup(GroupId::generate()),
    }
}

pub fn next_order_index(images: &[ImageRecord]) -> i64 {
    images
        .iter()
        .map(|image| image.order_index)
        .max()
        .map_or(0, |max| max + 1)
}

/// Rows for an uploaded batch, continuing after the project's current
/// highest index. `urls` are the public URLs of the uploaded files, in
/// batch order.
pub fn plan_batch_rows(
    existing: &[ImageRecord],
    batch: &UploadBatch,
    urls: Vec<String>,
) -> (Option<GroupId>, Vec<NewImage>) {
    let group_id = batch.layout.layout_kind.is_grid().then(GroupId::generate);
    let start = next_order_index(existing);

    let rows = urls
        .into_iter()
        .zip(&batch.files)
        .zip(start..)
        .map(|((image_url, file), order_index)| NewImage {
            project_id: batch.project_id,
            image_url,
            alt_text_primary: batch
                .alt_text_primary
                .clone()
                .filter(|alt| !alt.trim().is_empty())
                .unwrap_or_else(|| alt_from_file_name(&file.file_name)),
            alt_text_secondary: batch
                .alt_text_secondary
                .clone()
                .filter(|alt| !alt.trim().is_empty()),
            order_index,
            group_id,
            layout: batch.layout.clone(),
            ..NewImage::default()
        })
        .collect();
    (group_id, rows)
}

/// Object path for an uploaded file: `<prefix>/<project>/<millis>-<seq>-<name>`.
/// The timestamp and sequence keep paths unique within a batch and across
/// re-uploads of the same file name.
pub fn blob_path(
    prefix: &str,
    project_id: ProjectId,
    timestamp_millis: i64,
    sequence: usize,
    file_name: &str,
) -> String {
    format!(
        "{}/{}/{timestamp_millis}-{sequence}-{}",
        prefix.trim_matches('/'),
        project_id,
        sanitize_file_name(file_name)
    )
}

pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    cleaned = cleaned.trim_matches(['.', '-']).to_string();
    if cleaned.len() > MAX_FILE_NAME_BYTES {
        cleaned = cleaned[cleaned.len() - MAX_FILE_NAME_BYTES..].to_string();
    }
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

pub fn validate_layout(layout: &GroupLayout) -> GalleryResult<()> {
    if layout.padding > MAX_PADDING {
        return Err(GalleryError::Validation(format!(
            "padding must be at most {MAX_PADDING}px"
        )));
    }
    if let Some(ratio) = &layout.aspect_ratio {
        if parse_aspect_ratio(ratio).is_none() {
            return Err(GalleryError::Validation(format!(
                "aspect ratio '{ratio}' must look like W:H"
            )));
        }
    }
    Ok(())
}

/// Layout for a whole group; grid kinds only.
pub fn validate_group_layout(layout: &GroupLayout) -> GalleryResult<()> {
    if !layout.layout_kind.is_grid() {
        return Err(GalleryError::Validation(
            "a group layout must be a grid kind; dissolve the group instead".into(),
        ));
    }
    validate_layout(layout)
}

pub fn validate_alt_text(alt: &str) -> GalleryResult<()> {
    if alt.len() > MAX_ALT_TEXT_BYTES {
        return Err(GalleryError::Validation(format!(
            "alt text exceeds {MAX_ALT_TEXT_BYTES} bytes"
        )));
    }
    Ok(())
}

pub fn parse_aspect_ratio(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.trim().split_once(':')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

fn alt_from_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);
    stem.replace(['-', '_'], " ").trim().to_string()
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
