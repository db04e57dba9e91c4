/// Logging initialization: `tracing-subscriber::fmt` to stderr.
///
/// Filter comes from `RUST_LOG` when set. Safe to call more than once; only
/// the first subscriber installed in the process wins.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatsync_core=debug,info".into()),
        )
        .with_target(true)
        .try_init();
}
