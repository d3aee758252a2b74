//! Serde model of a COCO instances file.

use serde::{Deserialize, Deserializer};

/// Top-level COCO instances file.
#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub info: Option<serde_json::Value>,
    #[serde(default)]
    pub licenses: Option<serde_json::Value>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Image {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    /// Some exports omit this; the 12-digit id name is used instead.
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Image {
    /// File name on disk, falling back to `<12-digit zero padded id>.jpg`.
    pub fn file_name_or_default(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("{:012}.jpg", self.id))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// `[x, y, width, height]` in original pixel coordinates.
    pub bbox: [f64; 4],
    #[serde(default)]
    pub area: f64,
    #[serde(default, deserialize_with = "deserialize_iscrowd")]
    pub iscrowd: bool,
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
}

fn deserialize_iscrowd<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IsCrowd {
        Bool(bool),
        Int(u8),
    }
    match IsCrowd::deserialize(deserializer)? {
        IsCrowd::Bool(b) => Ok(b),
        IsCrowd::Int(i) => Ok(i != 0),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// One or more polygons, each a flat `[x0, y0, x1, y1, ...]` list.
    Polygons(Vec<Vec<f64>>),
    /// Run-length encoding; `size` is `[height, width]`.
    Rle { size: [u32; 2], counts: RleCounts },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    /// Plain run lengths, as written for crowd regions.
    Uncompressed(Vec<u32>),
    /// LEB128-like compressed string.
    Compressed(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: Option<String>,
}
