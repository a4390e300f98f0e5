//! Sessions: one navigable page inside the engine.
//!
//! Every [`Session`] operation is marshaled onto the engine loop and the
//! calling task suspends on a private single-slot channel until the engine
//! answers. Navigation is split into [`Session::open`], which only submits the
//! load, and [`Session::wait`], which observes its completion.

use tokio::sync::oneshot;
use tracing::debug;

use crate::engine::{Completion, Engine, EngineLoop, JsValue, PageId};
use crate::{PrerenderError, Result};

/// Entry point for creating sessions on an engine loop.
#[derive(Debug, Clone)]
pub struct Context {
    engine: EngineLoop,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A context on the process-wide engine loop.
    pub fn new() -> Self {
        Self::with_engine(EngineLoop::global())
    }

    pub fn with_engine(engine: EngineLoop) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &EngineLoop {
        &self.engine
    }

    /// Starts the engine loop if needed and creates a blank page.
    pub async fn new_session(&self) -> Result<Session> {
        self.engine.start();
        let owner = self.engine.clone();
        let page = call(&self.engine, move |engine, done: Completion<PageId>| {
            // A caller that gave up before the page existed leaves nobody to
            // close it, so release it here.
            engine.create_page(done.on_orphan(move |page| {
                debug!(%page, "releasing page created for an abandoned session");
                let _ = owner.submit(move |engine| engine.destroy(page));
            }))
        })
        .await?;
        debug!(%page, "session created");
        Ok(Session {
            page,
            engine: self.engine.clone(),
            pending: None,
            state: SessionState::Idle,
        })
    }
}

/// Navigation state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// One page inside the engine, owned by the task that created it.
///
/// `open` and `wait` take `&mut self` and `close` consumes the session, so a
/// session cannot be closed or re-navigated while another of its operations
/// is outstanding. Queries take `&self`; concurrent queries each get their own
/// reply channel.
#[derive(Debug)]
pub struct Session {
    page: PageId,
    engine: EngineLoop,
    pending: Option<oneshot::Receiver<Result<()>>>,
    state: SessionState,
}

impl Session {
    pub fn page_id(&self) -> PageId {
        self.page
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Starts loading `url` and returns without waiting for it.
    ///
    /// Fails with [`PrerenderError::NavigationInFlight`] if the previous
    /// navigation has not been observed with [`Session::wait`].
    pub fn open(&mut self, url: &str) -> Result<()> {
        if self.pending.is_some() {
            return Err(PrerenderError::NavigationInFlight);
        }

        let (done, rx) = Completion::channel();
        let page = self.page;
        let target = url.to_string();
        self.engine
            .submit(move |engine| engine.load(page, &target, done))?;
        debug!(%page, %url, "navigation started");
        self.pending = Some(rx);
        self.state = SessionState::Loading;
        Ok(())
    }

    /// Waits for the navigation started by the last [`Session::open`].
    ///
    /// Returns [`PrerenderError::LoadFailed`] if the engine could not load the
    /// page. Dropping this future (e.g. under an external timeout) abandons
    /// the navigation; its eventual result is discarded.
    pub async fn wait(&mut self) -> Result<()> {
        let rx = self.pending.take().ok_or(PrerenderError::NoNavigation)?;
        let result = rx.await.unwrap_or_else(|_| Err(self.engine.stopped()));
        self.state = if result.is_ok() {
            SessionState::Loaded
        } else {
            SessionState::Failed
        };
        result
    }

    /// Runs `script` in the page and returns its converted result.
    ///
    /// May be called before any load completes; the script then runs against
    /// whatever is currently rendered.
    pub async fn evaluate_script(&self, script: &str) -> Result<JsValue> {
        let script = script.to_string();
        self.call(move |engine, page, done| engine.evaluate(page, &script, done))
            .await
    }

    pub async fn uri(&self) -> Result<String> {
        self.call(|engine, page, done| engine.uri(page, done)).await
    }

    pub async fn title(&self) -> Result<String> {
        self.call(|engine, page, done| engine.title(page, done)).await
    }

    /// Releases the engine page. Dropping a session has the same effect.
    pub fn close(self) {
        drop(self);
    }

    async fn call<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Engine, PageId, Completion<T>) + Send + 'static,
    {
        let page = self.page;
        call(&self.engine, move |engine, done| op(engine, page, done)).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let page = self.page;
        // A stopped loop has already released every page.
        let _ = self.engine.submit(move |engine| engine.destroy(page));
        debug!(%page, "session closed");
    }
}

async fn call<T, F>(engine: &EngineLoop, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn Engine, Completion<T>) + Send + 'static,
{
    let (done, rx) = Completion::channel();
    engine.submit(move |engine| op(engine, done))?;
    rx.await.unwrap_or_else(|_| Err(engine.stopped()))
}
