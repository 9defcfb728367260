use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::service::modbus;

#[derive(Debug, Error)]
pub(crate) enum SubmitError {
  #[error("Write queue was closed")]
  Closed(#[from] flume::SendError<modbus::WriteRequest>),
}

/// FIFO queue draining writes onto one transport.
///
/// Any number of clones may submit; a single task performs the writes in
/// submission order.
#[derive(Clone)]
pub(crate) struct Dispatcher {
  sender: flume::Sender<modbus::WriteRequest>,
  token: CancellationToken,
  handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl Dispatcher {
  pub(crate) fn spawn(transport: Arc<dyn modbus::Transport>) -> Self {
    let (sender, receiver) = flume::unbounded::<modbus::WriteRequest>();
    let token = CancellationToken::new();
    let child_token = token.child_token();

    let handle = tokio::spawn(async move {
      loop {
        let request = tokio::select! {
          _ = child_token.cancelled() => { return; },
          request = receiver.recv_async() => match request {
            Ok(request) => request,
            Err(_) => { return; },
          },
        };

        let address = request.address;
        let unit = request.unit_id;
        match transport.write(request).await {
          Ok(()) => tracing::debug!(unit, address, "Written"),
          Err(error) => tracing::error! {
            %error,
            unit,
            address,
            "Write failed"
          },
        }
      }
    });

    Self {
      sender,
      token,
      handle: Arc::new(Mutex::new(Some(handle))),
    }
  }

  pub(crate) fn submit(
    &self,
    request: modbus::WriteRequest,
  ) -> Result<(), SubmitError> {
    self.sender.send(request)?;

    Ok(())
  }

  /// Stops the writer task; queued requests that were not started are
  /// dropped.
  #[tracing::instrument(skip(self))]
  pub(crate) async fn cancel(&self) {
    self.token.cancel();

    let handle = self.handle.lock().await.take();
    if let Some(handle) = handle {
      if let Err(error) = handle.await {
        tracing::error! {
          %error,
          "Joining write dispatcher on cancel failed"
        }
      }
    }

    tracing::trace!("{} writes left unsent", self.sender.len());
  }
}
