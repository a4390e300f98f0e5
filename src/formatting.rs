use std::io::Write;
use std::process::ExitCode;

use prerender_lib::{ErrorCategory, ErrorPayload, PrerenderError};

/// Exit code for invalid flags or configuration.
pub const EXIT_USAGE: u8 = 2;
/// Exit code for runtime failures (engine, load, readiness).
pub const EXIT_FAILURE: u8 = 1;

pub fn exit_code_for(err: &PrerenderError) -> ExitCode {
    match err.category() {
        ErrorCategory::Config | ErrorCategory::Usage => ExitCode::from(EXIT_USAGE),
        _ => ExitCode::from(EXIT_FAILURE),
    }
}

/// Prints `err` with its remediation hint to stderr and returns the exit code.
pub fn render_error(err: PrerenderError) -> ExitCode {
    let code = exit_code_for(&err);
    let payload = err.to_payload();
    let mut stderr = std::io::stderr().lock();
    if let Err(write_err) = stderr.write_all(format_error(&payload).as_bytes()) {
        tracing::error!(error = %write_err, "failed to write error output");
    }
    code
}

pub fn format_error(payload: &ErrorPayload) -> String {
    let category = serde_json::to_value(payload.category)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "error".to_string());
    let mut out = format!("Error ({category}): {}\n", payload.message);
    if let Some(hint) = &payload.remediation {
        out.push_str(&format!("  hint: {hint}\n"));
    }
    out
}
