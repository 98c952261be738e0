use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ProjectId);
id_newtype!(ImageId);

/// Opaque identifier shared by every member of a grid group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

impl GroupId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    #[default]
    Solo,
    Grid2,
    Grid3,
    Grid5,
}

impl LayoutKind {
    pub fn is_grid(self) -> bool {
        !matches!(self, LayoutKind::Solo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutKind::Solo => "solo",
            LayoutKind::Grid2 => "grid2",
            LayoutKind::Grid3 => "grid3",
            LayoutKind::Grid5 => "grid5",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "solo" => Some(LayoutKind::Solo),
            "grid2" => Some(LayoutKind::Grid2),
            "grid3" => Some(LayoutKind::Grid3),
            "grid5" => Some(LayoutKind::Grid5),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    #[default]
    Cover,
    Contain,
}

impl FitMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FitMode::Cover => "cover",
            FitMode::Contain => "contain",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cover" => Some(FitMode::Cover),
            "contain" => Some(FitMode::Contain),
            _ => None,
        }
    }
}

/// Which side of a grid row gets the larger cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DominantSide {
    #[default]
    None,
    Left,
    Right,
}

impl DominantSide {
    pub fn as_str(self) -> &'static str {
        match self {
            DominantSide::None => "none",
            DominantSide::Left => "left",
            DominantSide::Right => "right",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(DominantSide::None),
            "left" => Some(DominantSide::Left),
            "right" => Some(DominantSide::Right),
            _ => None,
        }
    }
}

/// Layout attributes shared by every member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupLayout {
    pub layout_kind: LayoutKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub fit_mode: FitMode,
    #[serde(default)]
    pub padding: u32,
    #[serde(default)]
    pub dominant_side: DominantSide,
}

impl GroupLayout {
    pub fn with_kind(layout_kind: LayoutKind) -> Self {
        Self {
            layout_kind,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub project_id: ProjectId,
    pub image_url: String,
    pub alt_text_primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text_secondary: Option<String>,
    pub order_index: i64,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub layout: GroupLayout,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Ungrouped records render solo whatever their stored layout says.
    pub fn effective_layout_kind(&self) -> LayoutKind {
        match self.group_id {
            Some(_) => self.layout.layout_kind,
            None => LayoutKind::Solo,
        }
    }
}

/// Insert form of an image row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImage {
    pub project_id: ProjectId,
    pub image_url: String,
    pub alt_text_primary: String,
    pub alt_text_secondary: Option<String>,
    pub order_index: i64,
    pub is_active: bool,
    pub group_id: Option<GroupId>,
    pub layout: GroupLayout,
}

impl Default for NewImage {
    fn default() -> Self {
        Self {
            project_id: ProjectId(0),
            image_url: String::new(),
            alt_text_primary: String::new(),
            alt_text_secondary: None,
            order_index: 0,
            is_active: true,
            group_id: None,
            layout: GroupLayout::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub enum GroupKey {
    Group(GroupId),
    Solo(ImageId),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Group(group_id) => write!(f, "{group_id}"),
            GroupKey::Solo(image_id) => write!(f, "solo-{image_id}"),
        }
    }
}

impl From<GroupKey> for String {
    fn from(value: GroupKey) -> Self {
        value.to_string()
    }
}

/// Derived view over a project's images; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    pub group_key: GroupKey,
    pub order_index: i64,
    pub members: Vec<ImageRecord>,
}

impl GroupView {
    pub fn is_solo(&self) -> bool {
        matches!(self.group_key, GroupKey::Solo(_))
    }

    pub fn contains(&self, image_id: ImageId) -> bool {
        self.members.iter().any(|member| member.id == image_id)
    }

    pub fn layout_kind(&self) -> LayoutKind {
        self.members
            .first()
            .map(ImageRecord::effective_layout_kind)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
