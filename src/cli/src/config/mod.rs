mod args;
mod env;
mod file;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::service::modbus;

#[derive(Debug, Clone)]
pub(crate) struct Cloud {
  pub(crate) timeout: chrono::Duration,
  pub(crate) ssl: bool,
  pub(crate) domain: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Transport {
  pub(crate) host: String,
  pub(crate) port: u16,
  pub(crate) framing: modbus::Framing,
  pub(crate) timeout: Option<chrono::Duration>,
}

impl Transport {
  pub(crate) fn destination(&self) -> modbus::Destination {
    modbus::Destination {
      host: self.host.clone(),
      port: self.port,
      framing: self.framing,
    }
  }
}

#[derive(Debug, Clone)]
pub(crate) struct Device {
  pub(crate) unit_id: modbus::UnitId,
  pub(crate) name: String,
  pub(crate) timeseries: Vec<modbus::Item>,
  pub(crate) attributes: Vec<modbus::Item>,
  pub(crate) attributes_poll_period: Option<chrono::Duration>,
  pub(crate) timeseries_poll_period: Option<chrono::Duration>,
  pub(crate) send_data_only_on_change: Option<bool>,
  pub(crate) configuration: Vec<modbus::WriteRequest>,
}

#[derive(Debug, Clone)]
pub(crate) struct Server {
  pub(crate) transport: Transport,
  pub(crate) devices: Vec<Device>,
}

#[derive(Debug, Clone)]
pub(crate) struct Modbus {
  pub(crate) request_timeout: chrono::Duration,
  pub(crate) termination_timeout: chrono::Duration,
  pub(crate) poll_period: chrono::Duration,
  pub(crate) send_data_only_on_change: bool,
  pub(crate) servers: Vec<Server>,
}

#[derive(Debug, Clone)]
pub(crate) struct Values {
  pub(crate) cloud: Cloud,
  pub(crate) modbus: Modbus,
  pub(crate) log_level: tracing::level_filters::LevelFilter,
}

#[derive(Debug, Clone)]
struct Unparsed {
  from_args: args::Values,
  from_env: env::Values,
  from_file: file::Values,
}

#[derive(Debug, Clone)]
pub(crate) struct Manager {
  lock: Arc<Mutex<Unparsed>>,
}

#[derive(Debug, Error)]
pub(crate) enum ReadError {
  #[error("Failed reading file")]
  FileReadError(#[from] file::ParseError),

  #[error("Failed reading env")]
  EnvReadError(#[from] env::ParseError),
}

impl Manager {
  pub(crate) async fn new() -> Result<Self, ReadError> {
    let config = Self::read_async().await?;

    let config_manager = Self {
      lock: Arc::new(Mutex::new(config)),
    };

    Ok(config_manager)
  }

  pub(crate) async fn values(&self) -> Values {
    let config = self.lock.lock().await.clone();

    Self::parse(config)
  }

  fn parse(config: Unparsed) -> Values {
    Values {
      log_level: config.from_file.log_level.map_or_else(
        || {
          if config.from_args.trace {
            tracing::level_filters::LevelFilter::TRACE
          } else {
            #[cfg(debug_assertions)]
            {
              tracing::level_filters::LevelFilter::DEBUG
            }
            #[cfg(not(debug_assertions))]
            {
              tracing::level_filters::LevelFilter::INFO
            }
          }
        },
        |log_level| match log_level {
          file::LogLevel::Trace => tracing::level_filters::LevelFilter::TRACE,
          file::LogLevel::Debug => tracing::level_filters::LevelFilter::DEBUG,
          file::LogLevel::Info => tracing::level_filters::LevelFilter::INFO,
          file::LogLevel::Warn => tracing::level_filters::LevelFilter::WARN,
          file::LogLevel::Error => tracing::level_filters::LevelFilter::ERROR,
        },
      ),
      cloud: Cloud {
        timeout: file::milliseconds_to_chrono(
          config.from_file.cloud.timeout.unwrap_or(30000),
        ),
        ssl: config.from_env.cloud.ssl,
        domain: config.from_env.cloud.domain,
      },
      modbus: Modbus {
        request_timeout: file::milliseconds_to_chrono(
          config.from_file.modbus.request_timeout.unwrap_or(1000),
        ),
        termination_timeout: file::milliseconds_to_chrono(
          config
            .from_file
            .modbus
            .termination_timeout
            .unwrap_or(10_000),
        ),
        poll_period: file::milliseconds_to_chrono(
          config.from_file.modbus.poll_period.unwrap_or(1000),
        ),
        send_data_only_on_change: config
          .from_file
          .modbus
          .send_data_only_on_change
          .unwrap_or(false),
        servers: config
          .from_file
          .modbus
          .servers
          .into_iter()
          .map(|server| Server {
            transport: Transport {
              host: server.transport.host,
              port: server.transport.port,
              framing: file::to_modbus_framing(server.transport.framing),
              timeout: server
                .transport
                .timeout
                .map(file::milliseconds_to_chrono),
            },
            devices: server
              .devices
              .into_iter()
              .map(|device| Device {
                unit_id: device.unit_id,
                name: device.device_name,
                timeseries: device
                  .timeseries
                  .into_iter()
                  .map(file::to_modbus_item)
                  .collect(),
                attributes: device
                  .attributes
                  .into_iter()
                  .map(file::to_modbus_item)
                  .collect(),
                attributes_poll_period: device
                  .attributes_poll_period
                  .map(file::milliseconds_to_chrono),
                timeseries_poll_period: device
                  .timeseries_poll_period
                  .map(file::milliseconds_to_chrono),
                send_data_only_on_change: device.send_data_only_on_change,
                configuration: device
                  .configuration
                  .into_iter()
                  .map(|register| {
                    file::to_modbus_write_request(device.unit_id, register)
                  })
                  .collect(),
              })
              .collect(),
          })
          .collect(),
      },
    }
  }

  async fn read_async() -> Result<Unparsed, ReadError> {
    let from_args = args::parse();
    let from_env = env::parse()?;
    let from_file = file::parse_async(from_args.config.as_deref()).await?;

    Ok(Unparsed {
      from_args,
      from_env,
      from_file,
    })
  }
}
