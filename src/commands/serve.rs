use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use prerender_lib::{serve, Context, ProxyState, StaticRenderer};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::RenderArgs;
use crate::formatting::render_error;
use crate::settings::{apply_render_args, apply_serve_args};

/// Run the static reverse proxy until Ctrl-C.
pub async fn run_serve(
    config_path: Option<PathBuf>,
    bind: Option<SocketAddr>,
    redirect_prefixes: Option<Vec<String>>,
    render: RenderArgs,
) -> ExitCode {
    let config = match super::resolve_config(config_path.as_deref(), |config| {
        apply_render_args(config, &render);
        apply_serve_args(config, bind, redirect_prefixes);
    }) {
        Ok(config) => config,
        Err(err) => return render_error(err),
    };

    super::install_engine(&config);
    let context = Context::new();
    context.engine().start();

    let listener = match TcpListener::bind(config.bind).await {
        Ok(listener) => listener,
        Err(err) => return render_error(err.into()),
    };

    let renderer = Arc::new(StaticRenderer::new(context, config.render_options()));
    let state = ProxyState::new(Arc::clone(&renderer), config.redirect_prefixes.clone());

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received; shutting down"),
            Err(err) => warn!(error = %err, "failed to listen for interrupt; shutting down"),
        }
        signal.cancel();
    });

    let result = serve(listener, state, shutdown).await;
    renderer.release().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => render_error(err),
    }
}
