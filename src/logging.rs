use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for JSON results.
///
/// `RUST_LOG` takes precedence, then `GRADER_LOG`, then the level implied
/// by `verbose`.
pub fn init_tracing(verbose: bool, log_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose { "essay_grader=debug" } else { "essay_grader=info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("GRADER_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
