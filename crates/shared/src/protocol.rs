use serde::{Deserialize, Serialize};

use crate::domain::{
    DominantSide, FitMode, GroupId, GroupLayout, GroupView, ImageId, LayoutKind, Project,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPatchRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub direction: Direction,
}

/// Per-image edit; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagePatchRequest {
    #[serde(default)]
    pub alt_text_primary: Option<String>,
    #[serde(default)]
    pub alt_text_secondary: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub layout_kind: Option<LayoutKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupLayoutRequest {
    pub layout_kind: LayoutKind,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub fit_mode: FitMode,
    #[serde(default)]
    pub padding: u32,
    #[serde(default)]
    pub dominant_side: DominantSide,
}

impl From<GroupLayoutRequest> for GroupLayout {
    fn from(value: GroupLayoutRequest) -> Self {
        Self {
            layout_kind: value.layout_kind,
            aspect_ratio: value.aspect_ratio,
            fit_mode: value.fit_mode,
            padding: value.padding,
            dominant_side: value.dominant_side,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadBatchResponse {
    pub image_ids: Vec<ImageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderResponse {
    pub changed: bool,
    pub updated_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted_rows: u64,
    pub media_removed: usize,
    pub media_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryPayload {
    pub project: Project,
    pub groups: Vec<GroupView>,
}
