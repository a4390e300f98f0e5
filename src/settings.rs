use std::net::SocketAddr;

use prerender_lib::Config;

use crate::cli::RenderArgs;

/// Overlays render flags on `config`. Flags that were not given keep the
/// config value; switches can only turn a policy on.
pub fn apply_render_args(config: &mut Config, args: &RenderArgs) {
    if let Some(target) = &args.target {
        config.target = target.clone();
    }
    if let Some(wait) = args.wait {
        config.wait = wait;
    }
    if let Some(poll_interval) = args.poll_interval {
        config.poll_interval = poll_interval;
    }
    if let Some(expression) = &args.ready_expression {
        config.ready_expression = expression.clone();
    }
    if let Some(chrome) = &args.chrome {
        config.chrome.executable = Some(chrome.clone());
    }
    config.unfinished |= args.unfinished;
    config.remove_scripts |= args.remove_scripts;
    config.chrome.no_sandbox |= args.no_sandbox;
}

/// Overlays the proxy-only flags on `config`.
pub fn apply_serve_args(
    config: &mut Config,
    bind: Option<SocketAddr>,
    redirect_prefixes: Option<Vec<String>>,
) {
    if let Some(bind) = bind {
        config.bind = bind;
    }
    if let Some(prefixes) = redirect_prefixes {
        config.redirect_prefixes = prefixes
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn unset_flags_keep_config_values() {
        let mut config = Config::from_toml_str(
            r#"
target = "http://app.internal:8080"
wait = "10s"
unfinished = true
"#,
        )
        .unwrap();

        apply_render_args(&mut config, &RenderArgs::default());

        assert_eq!(config.target, "http://app.internal:8080");
        assert_eq!(config.wait, Duration::from_secs(10));
        assert!(config.unfinished);
    }

    #[test]
    fn cli_flags_override_config() {
        let mut config = Config::default();
        let args = RenderArgs {
            target: Some("https://example.com/".to_string()),
            wait: Some(Duration::from_millis(750)),
            poll_interval: Some(Duration::from_millis(5)),
            unfinished: true,
            remove_scripts: true,
            ready_expression: Some("window.appReady".to_string()),
            chrome: Some(PathBuf::from("/opt/chrome")),
            no_sandbox: true,
        };

        apply_render_args(&mut config, &args);

        assert_eq!(config.target, "https://example.com/");
        assert_eq!(config.wait, Duration::from_millis(750));
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert!(config.unfinished);
        assert!(config.remove_scripts);
        assert_eq!(config.ready_expression, "window.appReady");
        assert_eq!(config.chrome.executable, Some(PathBuf::from("/opt/chrome")));
        assert!(config.chrome.no_sandbox);
    }

    #[test]
    fn serve_args_override_bind_and_prefixes() {
        let mut config = Config::default();
        apply_serve_args(
            &mut config,
            Some("127.0.0.1:4000".parse().unwrap()),
            Some(vec![" /assets".to_string(), String::new()]),
        );

        assert_eq!(config.bind.port(), 4000);
        assert_eq!(config.redirect_prefixes, ["/assets"]);
    }

    #[test]
    fn serve_args_absent_keep_defaults() {
        let mut config = Config::default();
        apply_serve_args(&mut config, None, None);
        assert_eq!(config.bind, Config::default().bind);
        assert_eq!(config.redirect_prefixes, Config::default().redirect_prefixes);
    }
}
