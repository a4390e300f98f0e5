//! A deterministic in-process engine.
//!
//! `ScriptedEngine` serves pages registered on a [`ScriptedSite`] by exact URL
//! and understands a small, fixed set of expressions:
//!
//! - `document.documentElement.outerHTML`, `document.title`,
//!   `window.location.href` (also `location.href`, `document.URL`)
//! - `window.NAME` / `globalThis.NAME` for page globals and readiness flags
//! - JSON literals and single-quoted strings
//! - `throw ...`, which fails the evaluation
//!
//! Anything else fails with a `ReferenceError`, as an undefined identifier
//! would in a browser.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::LocalBoxFuture;
use serde_json::Map;

use super::{Completion, Engine, EngineFactory, EngineLoop, JsValue, PageId};
use crate::{PrerenderError, Result};

const BLANK_URL: &str = "about:blank";
const BLANK_DOCUMENT: &str = "<html><head></head><body></body></html>";

/// A page served by the scripted engine.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    title: String,
    body: String,
    document: Option<String>,
    load_delay: Duration,
    globals: Map<String, JsValue>,
    ready_flags: Vec<(String, Duration)>,
}

impl ScriptedPage {
    /// A page whose `<body>` contains `body`.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Replaces the generated markup with `html` verbatim.
    pub fn document(mut self, html: impl Into<String>) -> Self {
        self.document = Some(html.into());
        self
    }

    /// Delays load completion.
    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn global(mut self, name: impl Into<String>, value: impl Into<JsValue>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    /// `window.<flag>` reads false until `after` has elapsed since the load
    /// finished, then true.
    pub fn ready_after(mut self, flag: impl Into<String>, after: Duration) -> Self {
        self.ready_flags.push((flag.into(), after));
        self
    }

    pub fn outer_html(&self) -> String {
        match &self.document {
            Some(html) => html.clone(),
            None => format!(
                "<html><head><title>{}</title></head><body>{}</body></html>",
                self.title, self.body
            ),
        }
    }
}

#[derive(Debug, Default)]
struct SiteState {
    routes: HashMap<String, ScriptedPage>,
    hits: HashMap<String, usize>,
    live_pages: usize,
}

/// The set of pages a scripted engine can load, shared with the test that
/// built it so hits and live pages can be inspected.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSite {
    state: Arc<Mutex<SiteState>>,
}

impl ScriptedSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `page` at exactly `url`. Unregistered URLs fail to load.
    pub fn route(&self, url: impl Into<String>, page: ScriptedPage) -> &Self {
        self.lock().routes.insert(url.into(), page);
        self
    }

    /// Number of load attempts for `url`, successful or not.
    pub fn hits(&self, url: &str) -> usize {
        self.lock().hits.get(url).copied().unwrap_or(0)
    }

    /// Pages created and not yet destroyed.
    pub fn live_pages(&self) -> usize {
        self.lock().live_pages
    }

    pub fn factory(&self) -> EngineFactory {
        let site = self.clone();
        Box::new(move || -> LocalBoxFuture<'static, Result<Box<dyn Engine>>> {
            Box::pin(async move { Ok(Box::new(ScriptedEngine::new(site)) as Box<dyn Engine>) })
        })
    }

    /// A fresh engine loop serving this site.
    pub fn engine_loop(&self) -> EngineLoop {
        EngineLoop::new(self.factory())
    }

    fn visit(&self, url: &str) -> Option<ScriptedPage> {
        let mut state = self.lock();
        *state.hits.entry(url.to_string()).or_default() += 1;
        state.routes.get(url).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        // A panicking test thread must not hide the site from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
struct PageState {
    url: String,
    document: Option<ScriptedPage>,
    loaded_at: Option<Instant>,
    generation: u64,
}

impl PageState {
    fn blank() -> Self {
        Self {
            url: BLANK_URL.to_string(),
            document: None,
            loaded_at: None,
            generation: 0,
        }
    }

    fn finish_load(&mut self, url: String, document: ScriptedPage) {
        self.url = url;
        self.document = Some(document);
        self.loaded_at = Some(Instant::now());
    }

    fn title(&self) -> String {
        self.document
            .as_ref()
            .map(|doc| doc.title.clone())
            .unwrap_or_default()
    }

    fn outer_html(&self) -> String {
        self.document
            .as_ref()
            .map(ScriptedPage::outer_html)
            .unwrap_or_else(|| BLANK_DOCUMENT.to_string())
    }

    fn global(&self, name: &str) -> JsValue {
        let Some(doc) = &self.document else {
            return JsValue::Null;
        };
        if let Some((_, after)) = doc.ready_flags.iter().find(|(flag, _)| flag == name) {
            let ready = self.loaded_at.is_some_and(|at| at.elapsed() >= *after);
            return JsValue::Bool(ready);
        }
        doc.globals.get(name).cloned().unwrap_or(JsValue::Null)
    }

    fn evaluate(&self, script: &str) -> Result<JsValue> {
        let expr = script.trim().trim_end_matches(';').trim();
        match expr {
            "document.documentElement.outerHTML" => return Ok(JsValue::String(self.outer_html())),
            "document.title" | "window.document.title" => return Ok(JsValue::String(self.title())),
            "window.location.href" | "location.href" | "document.URL" => {
                return Ok(JsValue::String(self.url.clone()))
            }
            _ => {}
        }

        if let Some(name) = expr
            .strip_prefix("window.")
            .or_else(|| expr.strip_prefix("globalThis."))
        {
            return Ok(self.global(name));
        }
        if let Some(thrown) = expr.strip_prefix("throw ") {
            return Err(PrerenderError::script(format!("Uncaught {thrown}")));
        }
        if let Some(text) = expr.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return Ok(JsValue::String(text.to_string()));
        }
        serde_json::from_str(expr)
            .map_err(|_| PrerenderError::script(format!("ReferenceError: {expr} is not defined")))
    }
}

/// Engine over a [`ScriptedSite`]. Lives on the engine loop thread.
pub struct ScriptedEngine {
    site: ScriptedSite,
    pages: Rc<RefCell<HashMap<PageId, PageState>>>,
    next_id: u64,
}

impl ScriptedEngine {
    pub fn new(site: ScriptedSite) -> Self {
        Self {
            site,
            pages: Rc::new(RefCell::new(HashMap::new())),
            next_id: 1,
        }
    }

    fn with_page<T>(&self, page: PageId, done: Completion<T>, f: impl FnOnce(&PageState) -> Result<T>) {
        let pages = self.pages.borrow();
        match pages.get(&page) {
            Some(state) => done.complete(f(state)),
            None => done.fail(PrerenderError::PageClosed),
        }
    }
}

impl Engine for ScriptedEngine {
    fn create_page(&mut self, done: Completion<PageId>) {
        let id = PageId(self.next_id);
        self.next_id += 1;
        self.pages.borrow_mut().insert(id, PageState::blank());
        self.site.lock().live_pages += 1;
        done.succeed(id);
    }

    fn load(&mut self, page: PageId, url: &str, done: Completion<()>) {
        let mut pages = self.pages.borrow_mut();
        let Some(state) = pages.get_mut(&page) else {
            done.fail(PrerenderError::PageClosed);
            return;
        };
        state.generation += 1;
        let generation = state.generation;

        let Some(document) = self.site.visit(url) else {
            done.fail(PrerenderError::load_failed(url));
            return;
        };
        if document.load_delay.is_zero() {
            state.finish_load(url.to_string(), document);
            done.succeed(());
            return;
        }

        let pages = Rc::clone(&self.pages);
        let url = url.to_string();
        tokio::task::spawn_local(async move {
            tokio::time::sleep(document.load_delay).await;
            let mut pages = pages.borrow_mut();
            match pages.get_mut(&page) {
                Some(state) if state.generation == generation => {
                    state.finish_load(url, document);
                    done.succeed(());
                }
                // Superseded by a newer navigation on the same page.
                Some(_) => done.fail(PrerenderError::load_failed(url)),
                None => done.fail(PrerenderError::PageClosed),
            }
        });
    }

    fn evaluate(&mut self, page: PageId, script: &str, done: Completion<JsValue>) {
        self.with_page(page, done, |state| state.evaluate(script));
    }

    fn uri(&mut self, page: PageId, done: Completion<String>) {
        self.with_page(page, done, |state| Ok(state.url.clone()));
    }

    fn title(&mut self, page: PageId, done: Completion<String>) {
        self.with_page(page, done, |state| Ok(state.title()));
    }

    fn destroy(&mut self, page: PageId) {
        if self.pages.borrow_mut().remove(&page).is_some() {
            let mut site = self.site.lock();
            site.live_pages = site.live_pages.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loaded(page: ScriptedPage) -> PageState {
        let mut state = PageState::blank();
        state.finish_load("http://app.test/".to_string(), page);
        state
    }

    #[test]
    fn blank_page_reports_about_blank() {
        let state = PageState::blank();
        assert_eq!(state.evaluate("window.location.href").unwrap(), json!("about:blank"));
        assert_eq!(state.evaluate("document.title").unwrap(), json!(""));
        assert_eq!(
            state.evaluate("document.documentElement.outerHTML").unwrap(),
            json!(BLANK_DOCUMENT)
        );
        assert_eq!(state.evaluate("window.anything").unwrap(), JsValue::Null);
    }

    #[test]
    fn literals_evaluate_losslessly() {
        let state = loaded(ScriptedPage::new(""));
        assert_eq!(state.evaluate(r#""foo""#).unwrap(), json!("foo"));
        assert_eq!(state.evaluate("'bar'").unwrap(), json!("bar"));
        assert_eq!(state.evaluate("42").unwrap(), json!(42));
        assert_eq!(state.evaluate("-1.5").unwrap(), json!(-1.5));
        assert_eq!(state.evaluate("true;").unwrap(), json!(true));
        assert_eq!(state.evaluate("null").unwrap(), JsValue::Null);
        assert_eq!(state.evaluate("[1, \"a\"]").unwrap(), json!([1, "a"]));
    }

    #[test]
    fn document_queries_use_page_content() {
        let state = loaded(ScriptedPage::new("<p id=foo>bar</p>").title("qux"));
        assert_eq!(state.evaluate("window.document.title").unwrap(), json!("qux"));
        assert_eq!(
            state.evaluate("document.documentElement.outerHTML").unwrap(),
            json!("<html><head><title>qux</title></head><body><p id=foo>bar</p></body></html>")
        );
    }

    #[test]
    fn raw_document_overrides_generated_markup() {
        let page = ScriptedPage::new("ignored").document("<html>raw</html>");
        assert_eq!(page.outer_html(), "<html>raw</html>");
    }

    #[test]
    fn globals_and_ready_flags() {
        let state = loaded(
            ScriptedPage::new("")
                .global("answer", 42)
                .ready_after("$ready", Duration::ZERO)
                .ready_after("$later", Duration::from_secs(3600)),
        );
        assert_eq!(state.evaluate("window.answer").unwrap(), json!(42));
        assert_eq!(state.evaluate("globalThis.$ready").unwrap(), json!(true));
        assert_eq!(state.evaluate("window.$later").unwrap(), json!(false));
        assert_eq!(state.evaluate("window.missing").unwrap(), JsValue::Null);
    }

    #[test]
    fn unknown_expressions_and_throws_fail() {
        let state = loaded(ScriptedPage::new(""));
        let err = state.evaluate("document.querySelector('x')").unwrap_err();
        assert!(err.to_string().contains("ReferenceError"), "{err}");
        let err = state.evaluate("throw new Error('boom')").unwrap_err();
        assert!(err.to_string().contains("boom"), "{err}");
    }

    #[test]
    fn site_counts_hits_for_missing_routes() {
        let site = ScriptedSite::new();
        site.route("http://app.test/a", ScriptedPage::new("a"));
        assert!(site.visit("http://app.test/a").is_some());
        assert!(site.visit("http://app.test/missing").is_none());
        assert_eq!(site.hits("http://app.test/a"), 1);
        assert_eq!(site.hits("http://app.test/missing"), 1);
        assert_eq!(site.hits("http://app.test/never"), 0);
    }
}
