//! Engine bridge for headless page rendering.
//!
//! A rendering engine is only safe to drive from the one thread that owns it.
//! This module defines the capability such an engine exposes and the task loop
//! that marshals work from arbitrary callers onto that thread.
//!
//! # Module Structure
//!
//! - [`task_loop`] - The engine-owning thread and its FIFO work queue
//! - [`scripted`] - A deterministic in-process engine for tests and demos
//! - `chromium` - Headless Chromium via `chromiumoxide` (feature `chromium`)
//!
//! # Example
//!
//! ```no_run
//! use prerender_lib::{Context, EngineLoop, ScriptedPage, ScriptedSite};
//!
//! # async fn example() -> prerender_lib::Result<()> {
//! let site = ScriptedSite::new();
//! site.route("http://app.test/", ScriptedPage::new("<p>hi</p>").title("Hi"));
//!
//! let context = Context::with_engine(EngineLoop::new(site.factory()));
//! let mut session = context.new_session().await?;
//! session.open("http://app.test/")?;
//! session.wait().await?;
//! assert_eq!(session.title().await?, "Hi");
//! session.close();
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod scripted;
pub mod task_loop;

use crate::{PrerenderError, Result};
use futures::future::LocalBoxFuture;
use tokio::sync::oneshot;

pub use scripted::{ScriptedEngine, ScriptedPage, ScriptedSite};
pub use task_loop::EngineLoop;

/// A script result, independent of any scripting runtime.
///
/// `undefined` is reported as `Null`.
pub type JsValue = serde_json::Value;

/// Async constructor run on the engine thread to build the engine instance.
pub type EngineFactory = Box<dyn FnOnce() -> LocalBoxFuture<'static, Result<Box<dyn Engine>>> + Send>;

/// Identifies one page (tab) inside an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page-{}", self.0)
    }
}

/// Single-slot result cell handed to the engine with every operation.
///
/// The engine fulfils it exactly once, either before returning or later from a
/// task spawned on the loop thread. Dropping it unfulfilled reports
/// [`PrerenderError::EngineUnavailable`] to the waiting caller.
pub struct Completion<T> {
    tx: oneshot::Sender<Result<T>>,
    orphan: Option<Box<dyn FnOnce(T) + Send>>,
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("closed", &self.tx.is_closed())
            .field("orphan_hook", &self.orphan.is_some())
            .finish()
    }
}

impl<T> Completion<T> {
    pub fn channel() -> (Self, oneshot::Receiver<Result<T>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx, orphan: None }, rx)
    }

    /// Hands a successful value to `hook` instead of discarding it when the
    /// caller has stopped waiting. Used for values that own engine resources.
    pub fn on_orphan<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.orphan = Some(Box::new(hook));
        self
    }

    pub fn complete(self, result: Result<T>) {
        // The caller may have stopped waiting; the result is then discarded
        // unless an orphan hook claims it.
        if let Err(Ok(value)) = self.tx.send(result) {
            if let Some(hook) = self.orphan {
                hook(value);
            }
        }
    }

    pub fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    pub fn fail(self, err: PrerenderError) {
        self.complete(Err(err));
    }
}

/// The capability a rendering engine exposes to the task loop.
///
/// Every method is invoked on the engine thread, one unit of work at a time.
/// Operations on an unknown or destroyed page complete with
/// [`PrerenderError::PageClosed`].
pub trait Engine {
    fn create_page(&mut self, done: Completion<PageId>);

    /// Starts navigating `page` to `url`; `done` fires when the load finishes
    /// or fails.
    fn load(&mut self, page: PageId, url: &str, done: Completion<()>);

    fn evaluate(&mut self, page: PageId, script: &str, done: Completion<JsValue>);

    fn uri(&mut self, page: PageId, done: Completion<String>);

    fn title(&mut self, page: PageId, done: Completion<String>);

    /// Releases the page. Unknown pages are ignored.
    fn destroy(&mut self, page: PageId);
}

/// JavaScript truthiness of a converted script result.
pub fn is_truthy(value: &JsValue) -> bool {
    match value {
        JsValue::Null => false,
        JsValue::Bool(b) => *b,
        JsValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        JsValue::String(s) => !s.is_empty(),
        JsValue::Array(_) | JsValue::Object(_) => true,
    }
}
