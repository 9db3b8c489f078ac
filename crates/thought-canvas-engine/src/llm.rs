//! Topic service backed by an OpenAI-compatible chat-completions endpoint.
//!
//! Works with OpenAI, Ollama, vLLM and anything else that speaks
//! `POST {api_url}/chat/completions`. The expected JSON shape is described
//! to the model with a schemars schema, and replies wrapped in markdown code
//! fences are tolerated.

use std::env;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{ConfigError, ServiceError};
use crate::service::{CredentialProvider, Insight, TopicService, TopicSuggestion};

const DEFAULT_API_URL: &str = "http://localhost:11434/v1";
const DEFAULT_MODEL: &str = "llama3.2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Resolver configuration
// =============================================================================

/// One LLM endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResolver {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub api_url: String,
    /// Fixed key for this endpoint. When absent the session's
    /// [`CredentialProvider`] supplies one.
    #[serde(default)]
    pub api_key: Option<String>,
    pub model_name: String,
}

impl LlmResolver {
    pub fn new(api_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: None,
            model_name: model_name.into(),
        }
    }

    /// Local Ollama, which ignores the key.
    pub fn ollama(model_name: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: Some("ollama".to_string()),
            model_name: model_name.into(),
        }
    }

    /// Build from `TC_LLM_API_URL` / `OPENAI_API_URL` and `TC_LLM_MODEL` /
    /// `OPENAI_MODEL_NAME`, falling back to local Ollama.
    pub fn from_env() -> Self {
        let model = first_env(&["TC_LLM_MODEL", "OPENAI_MODEL_NAME"])
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        match first_env(&["TC_LLM_API_URL", "OPENAI_API_URL"]) {
            Some(url) => Self::new(url, model),
            None => Self::ollama(model),
        }
    }

    /// Load resolvers from a TOML file with a `[[resolvers]]` array.
    pub fn load_from_toml<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, ConfigError> {
        #[derive(Deserialize)]
        struct ResolverFile {
            resolvers: Vec<LlmResolver>,
        }

        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ResolverFile = toml::from_str(&raw)?;
        if file.resolvers.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{} defines no resolvers",
                path.display()
            )));
        }
        Ok(file.resolvers)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_url.trim_end_matches('/'))
    }
}

fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        env::var(k)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

// =============================================================================
// Response schema
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct ChildrenReply {
    topics: Vec<TopicSuggestion>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

fn system_prompt<T: JsonSchema>(task: &str) -> String {
    let schema =
        serde_json::to_string_pretty(&schema_for!(T)).unwrap_or_else(|_| "{}".to_string());
    [
        "You help people explore ideas as a growing tree of related topics.",
        task,
        "Respond ONLY with JSON matching this schema:",
        &format!("```json\n{schema}\n```"),
        "Do not wrap the JSON in explanations.",
    ]
    .join("\n\n")
}

fn scrub_response(raw: &str) -> &str {
    raw.trim()
        .trim_matches('`')
        .trim_start_matches("json")
        .trim_start_matches("JSON")
        .trim_matches(['`', ' ', '\n', '\r'])
}

fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T, ServiceError> {
    Ok(serde_json::from_str(scrub_response(raw))?)
}

/// Accepts either `{"topics": [...]}` or a bare array.
fn parse_children(raw: &str, desired_count: usize) -> Result<Vec<TopicSuggestion>, ServiceError> {
    let mut topics = match parse_reply::<ChildrenReply>(raw) {
        Ok(reply) => reply.topics,
        Err(_) => parse_reply::<Vec<TopicSuggestion>>(raw)?,
    };
    topics.truncate(desired_count);
    Ok(topics)
}

// =============================================================================
// Service
// =============================================================================

/// [`TopicService`] that asks an LLM, rotating over its resolvers.
pub struct LlmTopicService {
    resolvers: Vec<LlmResolver>,
    client: Client,
    cursor: AtomicUsize,
    credentials: Arc<dyn CredentialProvider>,
}

impl LlmTopicService {
    /// At least one resolver is required.
    pub fn new(
        resolvers: Vec<LlmResolver>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ConfigError> {
        if resolvers.is_empty() {
            return Err(ConfigError::Invalid("at least one resolver required".into()));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build http client: {e}")))?;
        Ok(Self {
            resolvers,
            client,
            cursor: AtomicUsize::new(0),
            credentials,
        })
    }

    pub fn from_env(credentials: Arc<dyn CredentialProvider>) -> Result<Self, ConfigError> {
        Self::new(vec![LlmResolver::from_env()], credentials)
    }

    fn select_resolver(&self) -> &LlmResolver {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.resolvers[idx % self.resolvers.len()]
    }

    async fn complete(&self, system: String, user: String) -> Result<String, ServiceError> {
        let resolver = self.select_resolver();
        let key = resolver
            .api_key
            .clone()
            .or_else(|| self.credentials.credential())
            .ok_or(ServiceError::MissingCredential)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| ServiceError::Transport(format!("invalid api key header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let body = json!({
            "model": resolver.model_name,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ]
        });

        debug!(model = %resolver.model_name, url = %resolver.api_url, "llm_request");
        let response = self
            .client
            .post(resolver.completions_url())
            .headers(headers)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ServiceError::MalformedResponse("response has no choices".into()))?;
        debug!(chars = content.len(), "llm_response");
        Ok(content)
    }
}

#[async_trait]
impl TopicService for LlmTopicService {
    async fn request_children(
        &self,
        parent_label: &str,
        desired_count: usize,
        ancestor_path: &[String],
        excluded: &[String],
    ) -> Result<Vec<TopicSuggestion>, ServiceError> {
        let system = system_prompt::<ChildrenReply>(&format!(
            "Propose up to {desired_count} distinct subtopics that deepen the given topic. \
             Labels must be short (at most five words) and must not repeat any excluded label."
        ));
        let user = json!({
            "topic": parent_label,
            "path": ancestor_path,
            "excluded": excluded,
            "count": desired_count,
        })
        .to_string();

        let raw = self.complete(system, user).await?;
        parse_children(&raw, desired_count).inspect_err(|err| {
            warn!(parent = parent_label, "failed to parse llm topics: {err}");
        })
    }

    async fn request_insight(&self, label: &str) -> Result<Insight, ServiceError> {
        let system = system_prompt::<Insight>(
            "Write a concise, informative description (two to four sentences) of the topic, \
             and list any sources you rely on.",
        );
        let user = json!({ "topic": label }).to_string();
        let raw = self.complete(system, user).await?;
        parse_reply(&raw)
    }

    fn requires_credential(&self) -> bool {
        self.resolvers.iter().any(|r| r.api_key.is_none())
    }
}
