//! The engine-owning task loop.
//!
//! One dedicated OS thread hosts a single-threaded tokio runtime and a
//! `LocalSet`. The engine is constructed on that thread and never leaves it.
//! Callers hand over boxed units of work which run strictly one at a time in
//! submission order; each unit carries its own [`Completion`](super::Completion)
//! back to the caller that submitted it.

use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use futures::future::LocalBoxFuture;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, error, info};

use super::{Engine, EngineFactory};
use crate::{PrerenderError, Result};

/// A unit of work executed against the engine on the loop thread.
pub type Job = Box<dyn FnOnce(&mut dyn Engine) + Send + 'static>;

static GLOBAL: OnceLock<EngineLoop> = OnceLock::new();

/// Handle to an engine task loop. Cheap to clone; all clones share one loop.
#[derive(Clone)]
pub struct EngineLoop {
    inner: Arc<LoopInner>,
}

struct LoopInner {
    name: String,
    factory: Mutex<Option<EngineFactory>>,
    jobs: OnceLock<mpsc::UnboundedSender<Job>>,
    // Shared with the loop thread, which must not hold `LoopInner` (and with
    // it the job sender) or the loop would never observe its handles drop.
    failure: Arc<OnceLock<String>>,
}

impl std::fmt::Debug for EngineLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineLoop")
            .field("name", &self.inner.name)
            .field("started", &self.is_started())
            .field("running", &self.is_running())
            .finish()
    }
}

impl EngineLoop {
    /// Creates a loop that will build its engine with `factory` once started.
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> LocalBoxFuture<'static, Result<Box<dyn Engine>>> + Send + 'static,
    {
        Self::named("engine-loop", Box::new(factory))
    }

    fn named(name: &str, factory: EngineFactory) -> Self {
        Self {
            inner: Arc::new(LoopInner {
                name: name.to_string(),
                factory: Mutex::new(Some(factory)),
                jobs: OnceLock::new(),
                failure: Arc::new(OnceLock::new()),
            }),
        }
    }

    /// The process-wide loop.
    ///
    /// If nothing was installed with [`EngineLoop::install_global`], the loop
    /// uses the default engine: headless Chromium when built with the
    /// `chromium` feature, otherwise an engine that always fails to start.
    pub fn global() -> Self {
        GLOBAL
            .get_or_init(|| Self::named("engine-loop-global", default_factory()))
            .clone()
    }

    /// Installs the process-wide loop. Returns false if one already exists.
    pub fn install_global<F>(factory: F) -> bool
    where
        F: FnOnce() -> LocalBoxFuture<'static, Result<Box<dyn Engine>>> + Send + 'static,
    {
        GLOBAL
            .set(Self::named("engine-loop-global", Box::new(factory)))
            .is_ok()
    }

    /// Starts the loop thread. Idempotent, including under concurrent calls:
    /// exactly one thread is ever spawned per loop.
    pub fn start(&self) {
        self.sender();
    }

    pub fn is_started(&self) -> bool {
        self.inner.jobs.get().is_some()
    }

    /// True while the loop is accepting work. False before start and after
    /// the engine failed to construct.
    pub fn is_running(&self) -> bool {
        self.inner.jobs.get().is_some_and(|tx| !tx.is_closed())
    }

    /// Enqueues `job` and returns immediately. Starts the loop if needed.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Engine) + Send + 'static,
    {
        self.sender()
            .send(Box::new(job))
            .map_err(|_| self.stopped())
    }

    /// The error reported for work the loop can no longer run. Carries the
    /// engine construction failure when that is why the loop stopped.
    pub fn stopped(&self) -> PrerenderError {
        match self.inner.failure.get() {
            Some(reason) => PrerenderError::engine_unavailable(reason.clone()),
            None => PrerenderError::engine_unavailable("engine loop has stopped"),
        }
    }

    fn sender(&self) -> &mpsc::UnboundedSender<Job> {
        self.inner.jobs.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let factory = self
                .inner
                .factory
                .lock()
                .ok()
                .and_then(|mut slot| slot.take());
            let failure = Arc::clone(&self.inner.failure);
            let spawned = thread::Builder::new()
                .name(self.inner.name.clone())
                .spawn(move || run_loop(factory, rx, failure));
            if let Err(err) = spawned {
                // rx was moved into the failed closure and dropped, so every
                // submission now reports the loop as stopped.
                error!(error = %err, "failed to spawn engine loop thread");
            }
            tx
        })
    }
}

fn run_loop(
    factory: Option<EngineFactory>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    failure: Arc<OnceLock<String>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build engine loop runtime");
            let _ = failure.set(format!("engine loop runtime failed to start: {err}"));
            return;
        }
    };

    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        let Some(factory) = factory else {
            error!("engine loop started without an engine factory");
            let _ = failure.set("engine loop started without an engine factory".to_string());
            return;
        };
        let mut engine = match factory().await {
            Ok(engine) => engine,
            Err(err) => {
                error!(error = %err, "rendering engine failed to start");
                let reason = match err {
                    PrerenderError::EngineUnavailable(reason) => reason,
                    other => other.to_string(),
                };
                let _ = failure.set(reason);
                return;
            }
        };
        info!("engine loop started");

        while let Some(job) = jobs.recv().await {
            job(engine.as_mut());
        }
        debug!("engine loop stopped; all handles dropped");
    });
}

#[cfg(feature = "chromium")]
fn default_factory() -> EngineFactory {
    super::chromium::factory(super::chromium::ChromiumOptions::default())
}

#[cfg(not(feature = "chromium"))]
fn default_factory() -> EngineFactory {
    Box::new(|| -> LocalBoxFuture<'static, Result<Box<dyn Engine>>> {
        Box::pin(async {
            Err(PrerenderError::engine_unavailable(
                "built without the chromium feature",
            ))
        })
    })
}
