//! Async exploration session.
//!
//! Wraps a [`LayoutEngine`] behind a tokio mutex, drives the topic service
//! without holding the lock across awaits, publishes a [`Frame`] after every
//! change and owns the animation task that ticks the engine.

use std::sync::{Arc, Weak};
use std::time::Duration;

use thought_canvas_core::{NodeId, TreeStore};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::{ExpansionOutcome, InsightOutcome, InsightRequest, LayoutEngine};
use crate::error::{EngineError, EngineResult, ServiceError};
use crate::render::Frame;
use crate::service::{CredentialProvider, TopicService};

/// Cloneable handle to one exploration.
///
/// The animation task only holds a weak reference, so dropping the last
/// handle ends it.
#[derive(Clone)]
pub struct ExplorationSession {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Mutex<LayoutEngine>,
    service: Arc<dyn TopicService>,
    credentials: Arc<dyn CredentialProvider>,
    frames: watch::Sender<Arc<Frame>>,
    cancel: CancellationToken,
    frame_period: Duration,
    animation: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn publish(&self, engine: &mut LayoutEngine) {
        self.frames.send_replace(Arc::new(engine.frame()));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ExplorationSession {
    pub fn new(
        config: EngineConfig,
        service: Arc<dyn TopicService>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> EngineResult<Self> {
        let frame_period = Duration::from_secs_f64(1.0 / f64::from(config.frame_rate));
        let mut engine = LayoutEngine::new(config)?;
        let (frames, _) = watch::channel(Arc::new(engine.frame()));
        Ok(Self {
            inner: Arc::new(Inner {
                engine: Mutex::new(engine),
                service,
                credentials,
                frames,
                cancel: CancellationToken::new(),
                frame_period,
                animation: std::sync::Mutex::new(None),
            }),
        })
    }

    /// Create the root for `topic` and enrich it with an insight.
    ///
    /// A failed insight leaves the root in place with the fallback
    /// description.
    pub async fn start(&self, topic: &str) -> EngineResult<NodeId> {
        self.ensure_live()?;
        let request = {
            let mut engine = self.inner.engine.lock().await;
            let request = engine.start_exploration(topic)?;
            self.inner.publish(&mut engine);
            request
        };
        self.ensure_animation();
        let id = request.node;
        self.run_insight(request).await;
        Ok(id)
    }

    /// Request and attach a new generation of children under `id`.
    ///
    /// Returns `Ok(None)` when an expansion of that node is already in flight.
    pub async fn expand(&self, id: NodeId) -> EngineResult<Option<ExpansionOutcome>> {
        self.ensure_live()?;
        let request = {
            let mut engine = self.inner.engine.lock().await;
            let request = engine.begin_expansion(id)?;
            if request.is_some() {
                self.inner.publish(&mut engine);
            }
            request
        };
        let Some(request) = request else {
            return Ok(None);
        };

        let result = match self.authorize().await {
            Ok(()) => {
                self.inner
                    .service
                    .request_children(
                        &request.parent_label,
                        request.desired_count,
                        &request.ancestor_path,
                        &request.excluded,
                    )
                    .await
            }
            Err(err) => Err(err),
        };

        let outcome = {
            let mut engine = self.inner.engine.lock().await;
            let outcome = engine.complete_expansion(&request, result);
            self.inner.publish(&mut engine);
            outcome
        };
        Ok(Some(outcome))
    }

    /// Refresh the description and sources of any node.
    pub async fn request_insight(&self, id: NodeId) -> EngineResult<Option<InsightOutcome>> {
        self.ensure_live()?;
        let request = {
            let mut engine = self.inner.engine.lock().await;
            let request = engine.begin_insight(id)?;
            if request.is_some() {
                self.inner.publish(&mut engine);
            }
            request
        };
        match request {
            Some(request) => Ok(Some(self.run_insight(request).await)),
            None => Ok(None),
        }
    }

    async fn run_insight(&self, request: InsightRequest) -> InsightOutcome {
        let result = match self.authorize().await {
            Ok(()) => self.inner.service.request_insight(&request.label).await,
            Err(err) => Err(err),
        };
        let mut engine = self.inner.engine.lock().await;
        let outcome = engine.complete_insight(&request, result);
        self.inner.publish(&mut engine);
        outcome
    }

    /// Make sure the service can be called, asking the provider if needed.
    async fn authorize(&self) -> Result<(), ServiceError> {
        if !self.inner.service.requires_credential() || self.inner.credentials.has_credential() {
            return Ok(());
        }
        if self.inner.credentials.request_credential().await {
            Ok(())
        } else {
            warn!("topic_service_credential_missing");
            Err(ServiceError::MissingCredential)
        }
    }

    /// Apply a synchronous change (collapse, drag, camera moves...) and
    /// publish the result.
    pub async fn update<R>(&self, f: impl FnOnce(&mut LayoutEngine) -> R) -> EngineResult<R> {
        self.ensure_live()?;
        let (result, populated) = {
            let mut engine = self.inner.engine.lock().await;
            let result = f(&mut engine);
            self.inner.publish(&mut engine);
            (result, !engine.is_empty())
        };
        if populated {
            self.ensure_animation();
        }
        Ok(result)
    }

    /// Receive every published frame.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Frame>> {
        self.inner.frames.subscribe()
    }

    pub fn current_frame(&self) -> Arc<Frame> {
        Arc::clone(&*self.inner.frames.borrow())
    }

    pub async fn snapshot(&self) -> Arc<TreeStore> {
        self.inner.engine.lock().await.snapshot()
    }

    /// Whether the animation task is currently running.
    pub fn is_animating(&self) -> bool {
        self.inner
            .animation
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// End the session: cancel the animation task and wait for it to exit.
    /// Later calls fail with [`EngineError::Stopped`].
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.animation.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "animation_task_join_failed");
            }
        }
        info!("exploration_session_stopped");
    }

    fn ensure_live(&self) -> EngineResult<()> {
        if self.inner.cancel.is_cancelled() {
            Err(EngineError::Stopped)
        } else {
            Ok(())
        }
    }

    fn ensure_animation(&self) {
        let Ok(mut slot) = self.inner.animation.lock() else {
            return;
        };
        if slot.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        *slot = Some(tokio::spawn(animate(weak, cancel, self.inner.frame_period)));
        debug!("animation_task_started");
    }
}

impl std::fmt::Debug for ExplorationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplorationSession")
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .field("frame_period", &self.inner.frame_period)
            .finish_non_exhaustive()
    }
}

/// Tick the engine once per frame until cancelled or the session is gone.
async fn animate(inner: Weak<Inner>, cancel: CancellationToken, period: Duration) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        let mut engine = inner.engine.lock().await;
        if engine.tick(dt) {
            inner.publish(&mut engine);
        }
    }
    debug!("animation_task_stopped");
}
