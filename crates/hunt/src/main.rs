//! `hunt` binary: load config, install logging, serve.

use hunt::prelude::*;

#[tokio::main]
async fn main() -> Result<(), HuntError> {
    let config = ServerConfig::from_env()?;
    init_logging(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind_addr,
        "starting Vampire Hunt server"
    );

    HuntServerBuilder::from_config(&config)?
        .build()
        .await?
        .run()
        .await
}
