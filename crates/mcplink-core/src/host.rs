//! Host facilities lent to MCP servers
//!
//! Servers may ask the host for its workspace roots (`roots/list`) or to run
//! the host's own language model on a message list (`sampling/createMessage`).
//! Both are abstracted behind async traits so the connection layer never
//! depends on a particular editor or inference backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// A workspace directory reported to servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRoot {
    pub name: String,
    pub uri: String,
}

impl WorkspaceRoot {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }

    /// Build a root from an absolute local directory, named after its last
    /// component. Relative paths have no file URI and yield `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let uri = Url::from_file_path(path).ok()?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Some(Self {
            name,
            uri: uri.to_string(),
        })
    }
}

#[async_trait]
pub trait RootsProvider: Send + Sync {
    /// Current workspace directories, in display order
    async fn workspace_roots(&self) -> anyhow::Result<Vec<WorkspaceRoot>>;
}

/// Fixed set of roots, for hosts without a dynamic workspace
#[derive(Debug, Clone, Default)]
pub struct StaticRoots {
    roots: Vec<WorkspaceRoot>,
}

impl StaticRoots {
    pub fn new(roots: Vec<WorkspaceRoot>) -> Self {
        Self { roots }
    }
}

#[async_trait]
impl RootsProvider for StaticRoots {
    async fn workspace_roots(&self) -> anyhow::Result<Vec<WorkspaceRoot>> {
        Ok(self.roots.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingRole {
    User,
    Assistant,
}

/// One chat message of a sampling request, reduced to its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: SamplingRole,
    pub text: String,
}

impl SamplingMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: SamplingRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: SamplingRole::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingRequest {
    pub messages: Vec<SamplingMessage>,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
}

/// The aggregated reply of the host model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingReply {
    /// Identifier of the model that answered
    pub model: String,
    pub text: String,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Run the request to completion and return the full reply text
    async fn complete(&self, request: SamplingRequest) -> anyhow::Result<SamplingReply>;
}

/// Facilities handed to every connection's client handler.
#[derive(Clone, Default)]
pub struct HostServices {
    pub roots: Option<Arc<dyn RootsProvider>>,
    /// Without a model, sampling requests are answered with method-not-found
    pub model: Option<Arc<dyn ModelProvider>>,
}

impl HostServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roots(mut self, roots: Arc<dyn RootsProvider>) -> Self {
        self.roots = Some(roots);
        self
    }

    pub fn with_model(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn supports_sampling(&self) -> bool {
        self.model.is_some()
    }

    /// Roots to report; empty when no provider is configured
    pub async fn workspace_roots(&self) -> anyhow::Result<Vec<WorkspaceRoot>> {
        match &self.roots {
            Some(provider) => provider.workspace_roots().await,
            None => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("roots", &self.roots.is_some())
            .field("model", &self.model.is_some())
            .finish()
    }
}
