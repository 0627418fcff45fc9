//! servo - session-scoped key/value item store over HTTP.

use anyhow::Result;
use clap::Parser;
use servo_node::{apply_env, init_logging, load_config, run, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.json_logs)?;

    let mut config = load_config(args.config.as_deref())?;
    apply_env(&mut config, |key| std::env::var(key).ok());

    run(config).await
}
