use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "prerender")]
#[command(
    version,
    about = "Prerender - Serve static HTML snapshots of a dynamic JavaScript application",
    long_about = "Prerender\n\nProxies a dynamic JavaScript application and serves an equivalent statically rendered HTML website, using a headless browser to render each page.\n\nModes:\n- serve: run the static reverse proxy.\n- render: render one path of the target and print its HTML.\n\nPages signal that they are ready for a snapshot by setting window.$renderStaticReady = true."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) with defaults for every flag; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the static reverse proxy
    Serve {
        #[arg(long = "http", value_name = "ADDR", help = "HTTP bind address [default: 0.0.0.0:13000]")]
        bind: Option<SocketAddr>,

        #[arg(
            long,
            value_delimiter = ',',
            value_name = "PREFIXES",
            help = "Comma-separated path prefixes to redirect to the target instead of rendering [default: /static,/api,/favicon.ico]"
        )]
        redirect_prefixes: Option<Vec<String>>,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Render a single path of the target and print the HTML to stdout
    Render {
        #[arg(default_value = "/", help = "Request path (and query) to render")]
        path: String,

        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RenderArgs {
    #[arg(long, value_name = "URL", help = "Base URL of the target application [default: http://localhost:3000]")]
    pub target: Option<String>,

    #[arg(
        long,
        value_parser = parse_duration,
        value_name = "DURATION",
        help = "Timeout for pages to set the readiness flag (e.g. 3s, 500ms) [default: 3s]"
    )]
    pub wait: Option<Duration>,

    #[arg(
        long,
        value_parser = parse_duration,
        value_name = "DURATION",
        help = "Delay between readiness checks [default: 50ms]"
    )]
    pub poll_interval: Option<Duration>,

    #[arg(long, help = "Return unfinished pages at the wait timeout instead of erroring")]
    pub unfinished: bool,

    #[arg(long, help = "Neutralize <script> tags in the rendered HTML")]
    pub remove_scripts: bool,

    #[arg(
        long,
        value_name = "JS",
        help = "Expression polled for readiness [default: window.$renderStaticReady]"
    )]
    pub ready_expression: Option<String>,

    #[arg(long, value_name = "PATH", help = "Chrome/Chromium executable (auto-detected if omitted)")]
    pub chrome: Option<PathBuf>,

    #[arg(long, help = "Launch the browser with --no-sandbox (needed in most containers)")]
    pub no_sandbox: bool,
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn serve_command_leaves_overrides_unset() {
        let cli = Cli::parse_from(["prerender", "serve"]);

        assert!(!cli.verbose);
        assert!(cli.config.is_none());
        match cli.command {
            Commands::Serve {
                bind,
                redirect_prefixes,
                render,
            } => {
                assert!(bind.is_none());
                assert!(redirect_prefixes.is_none());
                assert!(render.target.is_none());
                assert!(render.wait.is_none());
                assert!(!render.unfinished);
                assert!(!render.remove_scripts);
            }
            Commands::Render { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn serve_command_parses_flags() {
        let cli = Cli::parse_from([
            "prerender",
            "serve",
            "--http",
            "127.0.0.1:9000",
            "--target",
            "http://example.com",
            "--wait",
            "1500ms",
            "--unfinished",
            "--remove-scripts",
            "--redirect-prefixes",
            "/static,/api",
            "--verbose",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Commands::Serve {
                bind,
                redirect_prefixes,
                render,
            } => {
                assert_eq!(bind, Some("127.0.0.1:9000".parse().unwrap()));
                assert_eq!(
                    redirect_prefixes,
                    Some(vec!["/static".to_string(), "/api".to_string()])
                );
                assert_eq!(render.target.as_deref(), Some("http://example.com"));
                assert_eq!(render.wait, Some(Duration::from_millis(1500)));
                assert!(render.unfinished);
                assert!(render.remove_scripts);
            }
            Commands::Render { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn render_command_defaults_to_root_path() {
        let cli = Cli::parse_from(["prerender", "render", "--poll-interval", "10ms"]);
        match cli.command {
            Commands::Render { path, render } => {
                assert_eq!(path, "/");
                assert_eq!(render.poll_interval, Some(Duration::from_millis(10)));
            }
            Commands::Serve { .. } => panic!("expected render"),
        }
    }

    #[test]
    fn invalid_duration_is_rejected() {
        assert!(Cli::try_parse_from(["prerender", "serve", "--wait", "soon"]).is_err());
    }
}
