pub mod change;
pub mod cloud;
pub mod modbus;
pub mod telemetry;

use std::sync::Arc;

use crate::*;

pub trait Service {
  fn new(config: config::Values) -> Self;
}

#[derive(Clone)]
pub(crate) struct Container {
  modbus: modbus::Service,
  change: change::Filter,
  sink: Arc<dyn telemetry::Sink>,
}

impl Container {
  pub(crate) fn new(
    config: config::Values,
  ) -> Result<Self, cloud::ConstructionError> {
    let sink: Arc<dyn telemetry::Sink> = match &config.cloud.domain {
      Some(_) => Arc::new(cloud::Service::new(&config.cloud)?),
      None => {
        tracing::info!("No cloud domain configured - logging telemetry");
        Arc::new(telemetry::Log)
      }
    };

    Ok(Self {
      modbus: modbus::Service::new(config.clone()),
      change: change::Filter::new(config),
      sink,
    })
  }

  pub(crate) fn modbus(&self) -> &modbus::Service {
    &self.modbus
  }

  pub(crate) fn change(&self) -> &change::Filter {
    &self.change
  }

  pub(crate) fn sink(&self) -> Arc<dyn telemetry::Sink> {
    self.sink.clone()
  }
}
