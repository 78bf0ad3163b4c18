/// Install the global tracing subscriber for the engine.
///
/// Reads `RUST_LOG` from the environment (default level `info`). Safe to
/// call more than once; repeat initialization errors from `try_init` are
/// quietly ignored.
pub fn init() {
    let env = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env))
        .try_init();
}
