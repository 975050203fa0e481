use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directives used when `RUST_LOG` is unset. sqlx logs every statement at
/// `info`; a unification pass issues three bulk reads per refresh, so those
/// are kept at `warn`.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,sea_orm=warn";

/// JSON logs on stdout, filtered by `RUST_LOG` or [`DEFAULT_FILTER`].
/// Later calls keep the first subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(filter_from(std::env::var("RUST_LOG").ok().as_deref()))
        .with(fmt::layer().json())
        .try_init();
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
