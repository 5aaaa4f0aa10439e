use clap::Parser;

/// Command line / environment configuration for the relay.
#[derive(Parser, Debug, Clone)]
#[command(name = "arxiv-relay-api")]
#[command(about = "Relays arXiv figure images and extracts article text", long_about = None)]
pub struct Config {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}
