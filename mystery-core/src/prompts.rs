//! Prompt templates: an external fetch-and-cache source with embedded
//! fallbacks.
//!
//! Templates can be served by an external content service so editors can
//! change them without a redeploy; when the service is missing or a key is
//! absent, the embedded copies keep the core fully operational.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Template key for the character system prompt.
pub const CHARACTER_SYSTEM: &str = "character_system_prompt";
/// Template key for the Phase 1 skeleton system prompt.
pub const SKELETON_SYSTEM: &str = "scenario_skeleton_prompt";
/// Template key for the Phase 2 character-detail system prompt.
pub const DETAIL_SYSTEM: &str = "character_detail_prompt";
/// Template key for the murderer extension of the detail prompt.
pub const DETAIL_MURDERER: &str = "character_detail_murderer";
/// Template key for the innocent-suspect extension of the detail prompt.
pub const DETAIL_SUSPECT: &str = "character_detail_suspect";

/// An external template provider. `None` means "not available"; callers fall
/// back to the embedded templates and carry on.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn get_template(&self, key: &str) -> Option<String>;
}

/// The embedded copy of a template, if one exists for the key.
pub fn embedded(key: &str) -> Option<&'static str> {
    match key {
        CHARACTER_SYSTEM => Some(include_str!("prompts/character_system.txt")),
        SKELETON_SYSTEM => Some(include_str!("prompts/skeleton_system.txt")),
        DETAIL_SYSTEM => Some(include_str!("prompts/detail_system.txt")),
        DETAIL_MURDERER => Some(include_str!("prompts/detail_murderer.txt")),
        DETAIL_SUSPECT => Some(include_str!("prompts/detail_suspect.txt")),
        _ => None,
    }
}

/// Substitute `{key}` placeholders in a template.
///
/// Unknown placeholders are left as-is; templates are trusted content.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Template lookup combining an optional external source with the embedded
/// fallbacks.
#[derive(Clone, Default)]
pub struct TemplateLibrary {
    source: Option<Arc<dyn TemplateSource>>,
}

impl TemplateLibrary {
    /// Embedded templates only.
    pub fn embedded_only() -> Self {
        Self { source: None }
    }

    /// Prefer `source`, fall back to the embedded templates.
    pub fn with_source(source: Arc<dyn TemplateSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// Resolve a template, preferring the external source.
    ///
    /// Panics never: a key unknown to both layers yields an empty string,
    /// which only happens for keys this crate does not define.
    pub async fn get(&self, key: &str) -> String {
        if let Some(ref source) = self.source {
            if let Some(template) = source.get_template(key).await {
                return template;
            }
            tracing::debug!(key, "template not in external source, using embedded");
        }
        embedded(key).unwrap_or_default().to_string()
    }
}

/// Fetch-all-and-cache HTTP template source.
///
/// Fetches the full template map from `{base_url}/api/prompts/all` on first
/// use and serves every later lookup from the cache. Any HTTP failure is
/// logged and treated as "no templates".
pub struct HttpTemplateSource {
    base_url: String,
    client: reqwest::Client,
    cache: Mutex<Option<HashMap<String, String>>>,
}

impl HttpTemplateSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            cache: Mutex::new(None),
        }
    }

    async fn fetch_all(&self) -> Option<HashMap<String, String>> {
        let url = format!("{}/api/prompts/all", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<HashMap<String, String>>().await {
                    Ok(map) => {
                        tracing::info!(count = map.len(), "loaded prompt templates");
                        Some(map)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "template response was not a string map");
                        None
                    }
                }
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "template fetch failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "template fetch failed");
                None
            }
        }
    }

    /// Drop the cache so the next lookup refetches.
    pub async fn reload(&self) {
        let mut cache = self.cache.lock().await;
        *cache = None;
    }
}

#[async_trait]
impl TemplateSource for HttpTemplateSource {
    async fn get_template(&self, key: &str) -> Option<String> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.fetch_all().await.unwrap_or_default());
        }
        cache.as_ref().and_then(|map| map.get(key).cloned())
    }
}
