#![deny(
  unsafe_code,
  // reason = "Let's just not do it"
)]
#![deny(
  clippy::unwrap_used,
  clippy::expect_used,
  clippy::panic,
  clippy::unreachable,
  // reason = "We have to handle errors properly"
)]

mod config;
mod process;
mod service;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config = config::Manager::new().await?;

  let services_config = config.values().await;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    EnvFilter::default().add_directive(services_config.log_level.into())
  });
  tracing_subscriber::registry()
    .with(fmt::layer().with_target(true))
    .with(filter)
    .try_init()?;

  let services = service::Container::new(services_config)?;

  let processes = process::Container::new(config, services);

  processes.spawn().await;
  tokio::signal::ctrl_c().await?;
  tracing::info!("Shutting down");
  processes.cancel().await;

  Ok(())
}
