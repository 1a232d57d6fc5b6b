use tracing_subscriber::{filter::ParseError, EnvFilter};

/// `RUST_LOG` plus info-level defaults for the collector crates.
pub fn env_filter() -> Result<EnvFilter, ParseError> {
    Ok(EnvFilter::from_default_env()
        .add_directive("forecast_collector=info".parse()?)
        .add_directive("kma_client=info".parse()?))
}

pub fn init_tracing() -> Result<(), ParseError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter()?)
        .with_target(false)
        .init();
    Ok(())
}
