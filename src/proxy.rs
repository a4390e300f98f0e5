//! HTTP front for the static renderer.
//!
//! Requests under a redirect prefix are bounced to the target application;
//! everything else is rendered to a static snapshot.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::renderer::StaticRenderer;
use crate::{PrerenderError, Result};

#[derive(Debug, Clone)]
pub struct ProxyState {
    renderer: Arc<StaticRenderer>,
    redirect_prefixes: Arc<[String]>,
}

impl ProxyState {
    pub fn new(renderer: Arc<StaticRenderer>, redirect_prefixes: Vec<String>) -> Self {
        Self {
            renderer,
            redirect_prefixes: redirect_prefixes.into(),
        }
    }

    fn redirects(&self, path: &str) -> bool {
        self.redirect_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new().fallback(handle).with_state(state)
}

/// Serves `state` on `listener` until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: ProxyState, shutdown: CancellationToken) -> Result<()> {
    let local: SocketAddr = listener.local_addr()?;
    info!(
        addr = %local,
        target = %state.renderer.options().target_base_url,
        "listening and proxying"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// HTTP status reported for a failed render.
pub fn status_for(err: &PrerenderError) -> StatusCode {
    match err {
        PrerenderError::LoadFailed { .. } => StatusCode::BAD_GATEWAY,
        PrerenderError::ReadinessTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        PrerenderError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn handle(State(state): State<ProxyState>, uri: Uri) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    if state.redirects(uri.path()) {
        let location = format!(
            "{}{}",
            state.renderer.options().target_base_url.trim_end_matches('/'),
            path_and_query
        );
        debug!(%location, "redirecting to target");
        return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    }

    match state.renderer.render(path_and_query).await {
        Ok(page) => {
            debug!(url = %page.url, finished = page.finished, elapsed = ?page.elapsed, "rendered");
            (
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                page.html,
            )
                .into_response()
        }
        Err(err) => {
            let status = status_for(&err);
            warn!(path = %path_and_query, %status, error = %err, "render failed");
            (status, err.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScriptedSite;
    use crate::renderer::RenderOptions;
    use crate::session::Context;
    use std::time::Duration;

    fn state(prefixes: &[&str]) -> ProxyState {
        let renderer = StaticRenderer::new(
            Context::with_engine(ScriptedSite::new().engine_loop()),
            RenderOptions::default(),
        );
        ProxyState::new(
            Arc::new(renderer),
            prefixes.iter().map(|p| p.to_string()).collect(),
        )
    }

    #[test]
    fn redirect_prefix_matching() {
        let state = state(&["/static", "/favicon.ico"]);
        assert!(state.redirects("/static/app.js"));
        assert!(state.redirects("/favicon.ico"));
        assert!(!state.redirects("/"));
        assert!(!state.redirects("/about"));
    }

    #[test]
    fn status_mapping_matches_error_taxonomy() {
        assert_eq!(
            status_for(&PrerenderError::load_failed("http://x/")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&PrerenderError::ReadinessTimeout {
                url: "http://x/".to_string(),
                timeout: Duration::from_secs(1),
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&PrerenderError::script("boom")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&PrerenderError::UnexpectedValue("null".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&PrerenderError::engine_unavailable("gone")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
