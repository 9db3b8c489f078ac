//! Explore command implementation.
//!
//! Grows a topic tree level by level through an [`ExplorationSession`],
//! settles the layout and prints what a renderer would receive.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use thought_canvas_core::{Node, NodeId, TreeStore};
use thought_canvas_engine::{
    CredentialProvider, EngineConfig, EnvCredentials, ExplorationSession, ExpansionOutcome, Frame,
    LlmTopicService, OfflineTopicService, TopicService,
};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;

/// Output format for the explore report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Unknown format: {}. Use 'text' or 'json'", s),
        }
    }
}

/// Options for one exploration run.
#[derive(Debug, Clone)]
pub struct ExploreOptions {
    pub topic: String,
    /// Generations to grow below the root.
    pub depth: usize,
    pub offline: bool,
    /// Layout frames to simulate after growing.
    pub ticks: u32,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
}

/// Everything printed in JSON mode.
#[derive(Debug, Serialize)]
struct ExploreReport<'a> {
    topic: &'a str,
    root: NodeId,
    nodes: Vec<&'a Node>,
    frame: &'a Frame,
}

/// Run an exploration and write the report.
pub async fn execute(engine_config: EngineConfig, opts: ExploreOptions) -> Result<()> {
    let frame_dt = 1.0 / engine_config.frame_rate as f32;
    let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentials::default());
    let service = build_service(opts.offline, Arc::clone(&credentials))?;
    let session = ExplorationSession::new(engine_config, service, credentials)
        .context("Failed to create exploration session")?;

    let root = session.start(&opts.topic).await?;
    info!(topic = %opts.topic, root = %root, "exploration_started");

    let mut frontier = vec![root];
    for depth in 0..opts.depth {
        frontier = expand_generation(&session, frontier).await?;
        info!(depth = depth + 1, attached = frontier.len(), "generation_grown");
        if frontier.is_empty() {
            break;
        }
    }

    let frame = session
        .update(|engine| {
            for _ in 0..opts.ticks {
                engine.tick(frame_dt);
            }
            if let Some(position) = engine.node(root).map(|n| n.position) {
                engine.viewport_mut().center_on(position);
            }
            engine.frame()
        })
        .await?;
    let store = session.snapshot().await;
    session.stop().await;

    let content = match opts.format {
        OutputFormat::Json => render_json(&opts.topic, root, &store, &frame)?,
        OutputFormat::Text => render_text(&store, &frame),
    };

    match opts.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory: {}", parent.display())
                })?;
            }
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}

fn build_service(
    offline: bool,
    credentials: Arc<dyn CredentialProvider>,
) -> Result<Arc<dyn TopicService>> {
    if offline {
        return Ok(Arc::new(OfflineTopicService));
    }
    let resolvers = Config::llm_resolvers()?;
    let service = LlmTopicService::new(resolvers, credentials).context("Failed to build LLM client")?;
    Ok(Arc::new(service))
}

/// Expand every node in `frontier` concurrently and collect the new children.
async fn expand_generation(
    session: &ExplorationSession,
    frontier: Vec<NodeId>,
) -> Result<Vec<NodeId>> {
    let mut tasks = JoinSet::new();
    for id in frontier {
        let session = session.clone();
        tasks.spawn(async move { (id, session.expand(id).await) });
    }

    let mut next = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (id, result) = joined.context("Expansion task panicked")?;
        match result? {
            Some(ExpansionOutcome::Attached(ids)) => next.extend(ids),
            Some(ExpansionOutcome::Failed(message)) => {
                warn!(node = %id, error = %message, "expansion_failed");
                eprintln!("Expansion of {id} failed: {message}");
            }
            Some(ExpansionOutcome::Discarded) | None => {}
        }
    }
    next.sort();
    Ok(next)
}

fn render_json(topic: &str, root: NodeId, store: &TreeStore, frame: &Frame) -> Result<String> {
    let report = ExploreReport {
        topic,
        root,
        nodes: store.nodes().collect(),
        frame,
    };
    let mut json = serde_json::to_string_pretty(&report)?;
    json.push('\n');
    Ok(json)
}

fn render_text(store: &TreeStore, frame: &Frame) -> String {
    let mut out = String::new();
    for root in store.roots() {
        write_subtree(&mut out, store, root, 0);
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} nodes, {} edges, layout {:?}",
        frame.node_count, frame.edge_count, frame.layout_state
    );
    let _ = writeln!(
        out,
        "viewport: zoom {:.2}, {} nodes and {} edges on screen",
        frame.render.camera.zoom,
        frame.render.nodes.len(),
        frame.render.edges.len()
    );
    let _ = writeln!(
        out,
        "minimap: {} dots at scale {:.3}",
        frame.minimap.dots.len(),
        frame.minimap.scale
    );
    out
}

fn write_subtree(out: &mut String, store: &TreeStore, node: &Node, depth: usize) {
    let _ = write!(
        out,
        "{:indent$}{} ({:.0}, {:.0})",
        "",
        node.label,
        node.position.x,
        node.position.y,
        indent = depth * 2
    );
    if node.is_collapsed {
        out.push_str(" [collapsed]");
    }
    if let Some(err) = &node.last_error {
        let _ = write!(out, " [error: {err}]");
    }
    out.push('\n');
    for child in store.children_of(node.id) {
        write_subtree(out, store, child, depth + 1);
    }
}
