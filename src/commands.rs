mod render;
mod serve;

use std::path::Path;

use prerender_lib::{Config, Result};
use tracing::debug;

pub use render::run_render;
pub use serve::run_serve;

/// Loads the config file (or defaults) and lets `overlay` apply CLI flags
/// before validating the result.
pub(crate) fn resolve_config(
    config_path: Option<&Path>,
    overlay: impl FnOnce(&mut Config),
) -> Result<Config> {
    let mut config = Config::load(config_path)?;
    overlay(&mut config);
    config.validate()?;
    debug!(?config, "resolved configuration");
    Ok(config)
}

/// Installs the process-wide engine from the resolved browser settings.
#[cfg(feature = "chromium")]
pub(crate) fn install_engine(config: &Config) {
    use prerender_lib::engine::chromium;
    use prerender_lib::{ChromiumOptions, EngineLoop};

    let options = ChromiumOptions::from(&config.chrome);
    if !EngineLoop::install_global(chromium::factory(options)) {
        tracing::warn!("engine loop already installed; browser settings ignored");
    }
}

#[cfg(not(feature = "chromium"))]
pub(crate) fn install_engine(_config: &Config) {
    tracing::warn!("built without the chromium feature; renders will report the engine as unavailable");
}
