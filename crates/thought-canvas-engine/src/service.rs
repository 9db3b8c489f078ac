//! The external topic generator and the credential capability it needs.

use std::env;
use std::sync::Mutex;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thought_canvas_core::Source;

use crate::error::ServiceError;

/// One child topic proposed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TopicSuggestion {
    /// Short label, a few words at most.
    pub topic: String,
    /// One or two sentences explaining the topic.
    #[serde(default)]
    pub description: String,
}

impl TopicSuggestion {
    pub fn new(topic: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            description: description.into(),
        }
    }
}

/// Long-form enrichment for a single node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Insight {
    pub description: String,
    #[serde(default)]
    #[schemars(with = "Vec<SourceSchema>")]
    pub sources: Vec<Source>,
}

/// Schema stand-in for [`Source`], which lives in a crate without schemars.
#[derive(JsonSchema)]
#[allow(dead_code)]
struct SourceSchema {
    title: String,
    uri: String,
}

/// Asynchronous producer of child topics and insights.
#[async_trait]
pub trait TopicService: Send + Sync {
    /// Propose at most `desired_count` children for `parent_label`.
    async fn request_children(
        &self,
        parent_label: &str,
        desired_count: usize,
        ancestor_path: &[String],
        excluded: &[String],
    ) -> Result<Vec<TopicSuggestion>, ServiceError>;

    /// Describe a single topic.
    async fn request_insight(&self, label: &str) -> Result<Insight, ServiceError>;

    /// Whether calls need a credential from the [`CredentialProvider`].
    fn requires_credential(&self) -> bool {
        false
    }
}

/// Supplies the API credential for the topic service.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The credential, if one is available right now.
    fn credential(&self) -> Option<String>;

    fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    /// Ask for a credential, e.g. by prompting the user. Returns whether one
    /// is available afterwards.
    async fn request_credential(&self) -> bool {
        self.has_credential()
    }
}

/// Reads the credential from the first set environment variable.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    vars: Vec<String>,
}

impl EnvCredentials {
    pub fn new<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(["TC_LLM_API_KEY", "OPENAI_API_KEY"])
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    fn credential(&self) -> Option<String> {
        self.vars.iter().find_map(|var| {
            env::var(var)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
    }
}

/// A fixed credential, or none. Can be filled in later with [`StaticCredential::set`].
#[derive(Debug, Default)]
pub struct StaticCredential {
    value: Mutex<Option<String>>,
}

impl StaticCredential {
    pub fn new(value: Option<String>) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    pub fn set(&self, value: impl Into<String>) {
        if let Ok(mut guard) = self.value.lock() {
            *guard = Some(value.into());
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.value.lock().ok().and_then(|guard| guard.clone())
    }
}

/// Deterministic generator that needs no network, for demos and tests.
///
/// Children are drawn from a fixed list of facets combined with the parent
/// label, skipping excluded labels.
#[derive(Debug, Clone, Default)]
pub struct OfflineTopicService;

const FACETS: &[(&str, &str)] = &[
    ("History", "How {topic} came to be and the milestones along the way."),
    ("Core Ideas", "The central concepts that make {topic} work."),
    ("Applications", "Where {topic} is put to practical use."),
    ("Open Problems", "Questions about {topic} that remain unresolved."),
    ("Key Figures", "People whose work shaped {topic}."),
    ("Tools", "Instruments and techniques used when working with {topic}."),
    ("Criticism", "Common objections to {topic} and their merits."),
    ("Future", "Where {topic} is likely heading next."),
];

#[async_trait]
impl TopicService for OfflineTopicService {
    async fn request_children(
        &self,
        parent_label: &str,
        desired_count: usize,
        _ancestor_path: &[String],
        excluded: &[String],
    ) -> Result<Vec<TopicSuggestion>, ServiceError> {
        let taken = |label: &str| excluded.iter().any(|e| e.eq_ignore_ascii_case(label));
        Ok(FACETS
            .iter()
            .map(|(facet, blurb)| {
                TopicSuggestion::new(
                    format!("{parent_label}: {facet}"),
                    blurb.replace("{topic}", parent_label),
                )
            })
            .filter(|s| !taken(&s.topic))
            .take(desired_count)
            .collect())
    }

    async fn request_insight(&self, label: &str) -> Result<Insight, ServiceError> {
        Ok(Insight {
            description: format!("An overview of {label}, its background and the ideas around it."),
            sources: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_service_respects_count_and_exclusions() {
        let svc = OfflineTopicService;
        let first = svc
            .request_children("Rust", 3, &["Rust".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].topic, "Rust: History");

        let excluded: Vec<String> = first.iter().map(|s| s.topic.clone()).collect();
        let more = svc
            .request_children("Rust", 3, &["Rust".to_string()], &excluded)
            .await
            .unwrap();
        assert_eq!(more.len(), 3);
        assert!(more.iter().all(|s| !excluded.contains(&s.topic)));
    }

    #[tokio::test]
    async fn static_credential_can_be_filled_later() {
        let creds = StaticCredential::default();
        assert!(!creds.has_credential());
        assert!(!creds.request_credential().await);
        creds.set("sk-test");
        assert_eq!(creds.credential().as_deref(), Some("sk-test"));
    }

    #[test]
    fn env_credentials_skip_blank_values() {
        let creds = EnvCredentials::new(["TC_TEST_KEY_THAT_IS_NEVER_SET_1"]);
        assert!(!creds.has_credential());
    }

    #[test]
    fn blank_variable_does_not_shadow_a_later_one() {
        env::set_var("TC_TEST_CREDENTIAL_BLANK_2", "   ");
        env::set_var("TC_TEST_CREDENTIAL_VALID_2", " sk-test ");
        let creds =
            EnvCredentials::new(["TC_TEST_CREDENTIAL_BLANK_2", "TC_TEST_CREDENTIAL_VALID_2"]);
        assert_eq!(creds.credential().as_deref(), Some("sk-test"));

        let blank_only = EnvCredentials::new(["TC_TEST_CREDENTIAL_BLANK_2"]);
        assert!(!blank_only.has_credential());
    }
}
