use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise `verbose` (or `DOCQA_VERBOSE=true`)
/// selects debug output. Logs go to stderr so stdout stays machine-readable.
pub fn init(verbose: bool) {
    let verbose = verbose
        || std::env::var("DOCQA_VERBOSE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
    let default_level = if verbose { "docqa=debug,info" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
