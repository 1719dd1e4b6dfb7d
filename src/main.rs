mod app;
mod config;
mod db;
mod state;
mod users;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::state::AppState;

const DEFAULT_LOG_FILTER: &str = "userdesk=debug,axum=info,tower_http=info";

/// `RUST_LOG` picks the filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.with_target(false).json().init(),
        _ => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(store = ?config.store, "starting userdesk");

    let state = AppState::init(config).await?;
    let addr = state.config.addr();
    app::serve(app::build_app(state), &addr).await
}
