use arxiv_relay_api::{config::Config, server};
use clap::Parser;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::parse();
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    server::serve(listener, server::AppState::default()).await
}
