//! Runtime for Thought Canvas explorations.
//!
//! ```text
//!   TopicService ──(async)──▶ ExplorationSession ──▶ watch<Frame>
//!                                   │
//!                                   ▼
//!                              LayoutEngine
//!                    TreeStore ─ LayoutStrategy ─ Viewport
//!                                   │
//!                                   ▼
//!                        RenderSet + MinimapProjection
//! ```
//!
//! [`LayoutEngine`] is synchronous and owns all state. [`ExplorationSession`]
//! adds the topic service, the credential capability, frame publication and
//! the animation task on top of it.

pub mod config;
pub mod engine;
mod error;
pub mod llm;
pub mod render;
pub mod service;
pub mod session;
pub mod viewport;

pub use config::{EngineConfig, ExpansionConfig, ViewportConfig};
pub use engine::{ExpansionOutcome, ExpansionRequest, InsightOutcome, InsightRequest, LayoutEngine};
pub use error::{ConfigError, EngineError, EngineResult, ServiceError};
pub use llm::{LlmResolver, LlmTopicService};
pub use render::{Frame, MinimapDot, MinimapProjection, RenderSet, VisibleEdge, VisibleNode};
pub use service::{
    CredentialProvider, EnvCredentials, Insight, OfflineTopicService, StaticCredential,
    TopicService, TopicSuggestion,
};
pub use session::ExplorationSession;
pub use viewport::{Camera, Viewport};
