use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::*;

use super::connection::Destination;
use super::record::WriteRequest;
use super::register::{Item, Response, UnitId};
use super::worker::*;

/// Reads from and writes to the devices behind one link.
#[async_trait::async_trait]
pub(crate) trait Transport: Send + Sync {
  async fn read(
    &self,
    item: &Item,
    unit: UnitId,
  ) -> Result<Response, TransportError>;

  async fn write(&self, request: WriteRequest) -> Result<(), TransportError>;
}

#[derive(Clone, Debug)]
pub(crate) struct Service {
  servers: Arc<Mutex<HashMap<Destination, Worker>>>,
  request_timeout: chrono::Duration,
  termination_timeout: chrono::Duration,
}

impl service::Service for Service {
  fn new(config: config::Values) -> Self {
    Self {
      servers: Arc::new(Mutex::new(HashMap::new())),
      request_timeout: config.modbus.request_timeout,
      termination_timeout: config.modbus.termination_timeout,
    }
  }
}

impl Service {
  /// Returns the link to `destination`, spawning its worker on first use.
  #[tracing::instrument(skip(self))]
  pub(crate) async fn bind(
    &self,
    destination: Destination,
    request_timeout: Option<chrono::Duration>,
  ) -> Link {
    let mut servers = self.servers.clone().lock_owned().await;
    let worker = servers
      .entry(destination.clone())
      .or_insert_with(|| {
        let request_timeout = request_timeout.unwrap_or(self.request_timeout);
        Worker::new(
          destination.clone(),
          request_timeout,
          self.termination_timeout,
        )
      })
      .clone();

    tracing::trace!("Bound - current servers {:?}", servers.keys());

    Link {
      destination,
      worker,
    }
  }

  #[tracing::instrument(skip(self))]
  pub(crate) async fn terminate(&self) {
    let removed = {
      let mut servers = self.servers.clone().lock_owned().await;
      servers.drain().collect::<Vec<_>>()
    };

    for (destination, worker) in removed {
      if let Err(error) = worker.terminate().await {
        // NOTE: error -> trace because this means it already terminated and disconnected
        tracing::trace!(
          "Failed terminating worker for {:?} {}",
          destination,
          error
        )
      }
    }
  }
}

#[derive(Clone, Debug)]
pub(crate) struct Link {
  destination: Destination,
  worker: Worker,
}

impl Link {
  pub(crate) fn destination(&self) -> &Destination {
    &self.destination
  }
}

#[async_trait::async_trait]
impl Transport for Link {
  #[tracing::instrument(skip_all, fields(
    unit = unit,
    address = item.address,
    function_code = item.function_code.code()
  ))]
  async fn read(
    &self,
    item: &Item,
    unit: UnitId,
  ) -> Result<Response, TransportError> {
    let response = self.worker.read(unit, item).await?;

    tracing::trace!("Read {:?}", response);

    Ok(response)
  }

  #[tracing::instrument(skip_all, fields(
    unit = request.unit_id,
    address = request.address,
    function_code = request.function_code(),
    quantity = request.quantity()
  ))]
  async fn write(&self, request: WriteRequest) -> Result<(), TransportError> {
    self.worker.write(request).await?;

    tracing::trace!("Written");

    Ok(())
  }
}
