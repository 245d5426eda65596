use gemscout::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},gemscout=debug", config.level)));

    // GEMSCOUT_LOG_DIR wins over the configured directory; no directory means console only.
    let log_dir = std::env::var("GEMSCOUT_LOG_DIR")
        .ok()
        .map(std::path::PathBuf::from)
        .or_else(|| config.dir.clone());

    // `rolling::daily` panics if it cannot create the first file, so preflight writability.
    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                dir.display(),
                e
            );
            return None;
        }
        let probe = dir.join(".gemscout_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&probe) {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                let file_appender = tracing_appender::rolling::daily(&dir, "gemscout.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // The process lives as long as the guard must
                Box::leak(Box::new(guard));

                eprintln!("Logging to: {}/gemscout.log", dir.display());
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir.display(),
                    e
                );
                None
            }
        }
    });

    // Console goes to stderr so command output on stdout stays machine readable
    let (json_layer, text_layer) = if config.json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            ),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init();
}
