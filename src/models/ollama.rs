use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };

use super::chat::ChatMessage;

/// An installed model as reported by `GET /api/tags`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    /// Everything else the daemon reports (size, digest, details...).
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ModelInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), metadata: Map::new() }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
pub struct PullRequest<'a> {
    pub name: &'a str,
}

/// One status line of a pull stream.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PullProgress {
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatStreamChunk {
    /// The content delta carried by this chunk, if any and non-empty.
    pub fn delta(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.content.as_deref())
            .filter(|c| !c.is_empty())
    }
}

/// Finds the installed model a display name refers to.
///
/// Matches when the display name is a case-insensitive substring of the
/// installed name, so `llama3` resolves to `llama3:8b`. The first match in
/// daemon order wins.
pub fn resolve_model<'a>(installed: &'a [ModelInfo], display_name: &str) -> Option<&'a ModelInfo> {
    let needle = display_name.to_lowercase();
    installed.iter().find(|m| m.name.to_lowercase().contains(&needle))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub display_name: String,
    /// Canonical installed name, when the model is available locally.
    pub installed_as: Option<String>,
}

impl CatalogEntry {
    pub fn is_available(&self) -> bool {
        self.installed_as.is_some()
    }

    /// The name to pull: the installed variant when present, else the display name.
    pub fn pull_name(&self) -> &str {
        self.installed_as.as_deref().unwrap_or(&self.display_name)
    }
}

pub fn catalog_availability(catalog: &[String], installed: &[ModelInfo]) -> Vec<CatalogEntry> {
    catalog
        .iter()
        .map(|display_name| CatalogEntry {
            display_name: display_name.clone(),
            installed_as: resolve_model(installed, display_name).map(|m| m.name.clone()),
        })
        .collect()
}
