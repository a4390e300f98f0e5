//! Prerender Library
//!
//! Renders pages of dynamic, JavaScript-driven applications into static HTML
//! by driving a headless rendering engine and capturing its post-execution
//! DOM. Callers get programmatic sessions on the engine; the static renderer
//! and proxy layer turn that into a snapshot-serving reverse proxy.
//!
//! # Module Overview
//!
//! - [`engine`] - Engine capability and the single-threaded task loop that owns it
//! - [`session`] - Sessions (one page each) and the context that creates them
//! - [`renderer`] - Static snapshots with readiness polling and timeouts
//! - [`proxy`] - HTTP front: redirect prefixes, status mapping, serving
//! - [`config`] - Configuration file support
//! - [`error`] - Error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use prerender_lib::{Context, RenderOptions, StaticRenderer};
//!
//! # async fn example() -> prerender_lib::Result<()> {
//! let renderer = StaticRenderer::new(
//!     Context::new(),
//!     RenderOptions {
//!         target_base_url: "http://localhost:3000".to_string(),
//!         remove_scripts: true,
//!         ..RenderOptions::default()
//!     },
//! );
//! let page = renderer.render("/about").await?;
//! println!("{}", page.html);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod proxy;
pub mod renderer;
pub mod session;

pub use config::{ChromeConfig, Config};
pub use engine::{ScriptedEngine, ScriptedPage, ScriptedSite};
pub use engine::{is_truthy, Completion, Engine, EngineFactory, EngineLoop, JsValue, PageId};
pub use error::{ErrorCategory, ErrorPayload, PrerenderError, Result};
pub use proxy::{router, serve, status_for, ProxyState};
pub use renderer::{
    neutralize_scripts, RenderOptions, RenderedPage, StaticRenderer, DEFAULT_POLL_INTERVAL,
    DEFAULT_READY_EXPRESSION, DEFAULT_WAIT_TIMEOUT,
};
pub use session::{Context, Session, SessionState};

#[cfg(feature = "chromium")]
pub use engine::chromium::{ChromiumEngine, ChromiumOptions};
