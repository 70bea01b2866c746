//! The message extraction node binary.

use clap::Parser;
use mel_node::{constants::DEFAULT_LOG_FILTER, MelNodeArgs};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Enable backtraces unless a RUST_BACKTRACE value has already been explicitly provided.
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        std::env::set_var("RUST_BACKTRACE", "1");
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();

    if let Err(err) = mel_node::launch(MelNodeArgs::parse()).await {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
