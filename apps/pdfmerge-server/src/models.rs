//! Data models for the merge workspace

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque per-client session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Accepts only well-formed UUIDs, so the token is always safe as a directory name
    pub fn parse(token: &str) -> Option<Self> {
        Uuid::parse_str(token.trim()).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Identifier assigned to an upload; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(token: &str) -> Option<Self> {
        Uuid::parse_str(token).ok().map(Self)
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// What an upload needs before it can take part in a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Pdf,
    Image,
    WordDocument,
}

impl SourceKind {
    pub const ALLOWED_EXTENSIONS: [&'static str; 6] = ["pdf", "docx", "doc", "jpg", "jpeg", "png"];

    /// Map a lower-cased extension from the allow-list to its kind
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "pdf" => Some(SourceKind::Pdf),
            "jpg" | "jpeg" | "png" => Some(SourceKind::Image),
            "docx" | "doc" => Some(SourceKind::WordDocument),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Pdf => write!(f, "pdf"),
            SourceKind::Image => write!(f, "image"),
            SourceKind::WordDocument => write!(f, "word_document"),
        }
    }
}

/// Lower-cased text after the last dot of a client filename
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, extension) = filename.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

/// Metadata returned for a stored upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedItem {
    pub id: FileId,
    /// Filename as the client sent it
    pub name: String,
    /// 0 when the document could not be parsed
    pub pages: u32,
    /// Lower-cased original extension
    #[serde(rename = "type")]
    pub kind: String,
}

/// The single merge output a session may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeResult {
    Unprotected,
    Protected,
}

impl MergeResult {
    /// Lookup order when serving a result
    pub const LOOKUP_ORDER: [MergeResult; 2] = [MergeResult::Protected, MergeResult::Unprotected];

    pub fn preview_id(self) -> &'static str {
        match self {
            MergeResult::Unprotected => "merged_output",
            MergeResult::Protected => "merged_protected",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            MergeResult::Unprotected => "merged_output.pdf",
            MergeResult::Protected => "merged_protected.pdf",
        }
    }

    pub fn from_preview_id(id: &str) -> Option<Self> {
        Self::LOOKUP_ORDER
            .into_iter()
            .find(|result| result.preview_id() == id)
    }

    pub fn is_protected(self) -> bool {
        self == MergeResult::Protected
    }
}

/// Session lifecycle, derived from what the workspace holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "result")]
pub enum SessionState {
    Empty,
    HasItems,
    Merged(MergeResult),
}

/// Body of `POST /remove`
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveRequest {
    #[serde(default)]
    pub id: Option<String>,
}

/// Body of `POST /merge`
#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub protect: bool,
}

/// Response from merge operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResponse {
    pub success: bool,
    pub preview_id: String,
    pub protected: bool,
}

impl From<MergeResult> for MergeResponse {
    fn from(result: MergeResult) -> Self {
        Self {
            success: true,
            preview_id: result.preview_id().to_string(),
            protected: result.is_protected(),
        }
    }
}

/// Plain acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}
