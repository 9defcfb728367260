mod poll;
mod resolve;
mod schedule;
mod write;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::service::modbus;
use crate::{config, service};

pub(crate) struct Container {
  config: config::Manager,
  services: service::Container,
  scheduler: schedule::Interval,
  dispatchers: Arc<Mutex<Vec<write::Dispatcher>>>,
}

impl Container {
  pub(crate) fn new(
    config: config::Manager,
    services: service::Container,
  ) -> Self {
    Self {
      config,
      services,
      scheduler: schedule::Interval::default(),
      dispatchers: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Starts polling and write dispatch for every configured server.
  ///
  /// Device configuration registers are queued for writing once the
  /// server's dispatcher is running.
  pub(crate) async fn spawn(&self) {
    let config = self.config.values().await;
    let globals = resolve::GlobalDefaults::new(&config.modbus);

    if config.modbus.servers.is_empty() {
      tracing::warn!("No servers configured");
    }

    for server in &config.modbus.servers {
      let link = self
        .services
        .modbus()
        .bind(server.transport.destination(), server.transport.timeout)
        .await;
      tracing::info!("Polling {:?}", link.destination());
      let transport: Arc<dyn modbus::Transport> = Arc::new(link);

      let executor = poll::Executor::new(
        transport.clone(),
        self.services.sink(),
        self.services.change().clone(),
        server.transport.host.clone(),
        server.transport.port,
      );
      let handles =
        poll::register_all(server, globals, &executor, &self.scheduler).await;
      tracing::debug!(
        "Scheduled jobs {:?}",
        handles.iter().map(|handle| handle.id).collect::<Vec<_>>()
      );

      let dispatcher = write::Dispatcher::spawn(transport);
      for device in &server.devices {
        for request in &device.configuration {
          if let Err(error) = dispatcher.submit(request.clone()) {
            tracing::error! {
              %error,
              device = %device.name,
              address = request.address,
              "Failed queueing configuration write"
            }
          }
        }
      }
      self.dispatchers.lock().await.push(dispatcher);
    }

    tracing::info!("Running {} poll jobs", self.scheduler.len().await);
  }

  pub(crate) async fn cancel(&self) {
    self.scheduler.cancel().await;

    let dispatchers = {
      let mut dispatchers = self.dispatchers.lock().await;
      dispatchers.drain(..).collect::<Vec<_>>()
    };
    for dispatcher in dispatchers {
      dispatcher.cancel().await;
    }

    self.services.modbus().terminate().await;

    tracing::info!(
      "Stopped with {} tracked values",
      self.services.change().len().await
    );
  }
}
