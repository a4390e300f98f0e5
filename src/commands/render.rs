use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use prerender_lib::{Context, StaticRenderer};
use tracing::{info, warn};

use crate::cli::RenderArgs;
use crate::formatting::render_error;
use crate::settings::apply_render_args;

/// Render one path of the target and write the HTML to stdout.
pub async fn run_render(config_path: Option<PathBuf>, path: String, render: RenderArgs) -> ExitCode {
    let config = match super::resolve_config(config_path.as_deref(), |config| {
        apply_render_args(config, &render);
    }) {
        Ok(config) => config,
        Err(err) => return render_error(err),
    };

    super::install_engine(&config);
    let renderer = StaticRenderer::new(Context::new(), config.render_options());
    let result = renderer.render(&path).await;
    renderer.release().await;

    let page = match result {
        Ok(page) => page,
        Err(err) => return render_error(err),
    };
    if page.finished {
        info!(url = %page.url, elapsed = ?page.elapsed, "page rendered");
    } else {
        warn!(url = %page.url, "page never signaled readiness; output is unfinished");
    }

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = writeln!(stdout, "{}", page.html) {
        return render_error(err.into());
    }
    ExitCode::SUCCESS
}
