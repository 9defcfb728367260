use std::sync::Arc;

use futures_time::future::FutureExt;
use tokio::sync::Mutex;

use super::connection::*;
use super::record::WriteRequest;
use super::register::{Response, UnitId};
use super::span::{SimpleSpan, Span};

/// Handle to the task owning the link to one destination.
///
/// Every read and write is a message to that task so the link only ever
/// sees one request at a time, whoever sends it.
#[derive(Debug, Clone)]
pub(crate) struct Worker {
  sender: RequestSender,
  handle: Arc<Mutex<Option<TaskHandle>>>,
  termination_timeout: futures_time::time::Duration,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum TransportError {
  #[error("Failed to connect")]
  FailedToConnect(#[from] ConnectError),

  #[error("Request failed")]
  Request(#[from] RequestError),

  #[error("Channel was disconnected before the request could be finished")]
  ChannelDisconnected(anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum TerminateError {
  #[error("Channel was disconnected before the request could be finished")]
  ChannelDisconnected(anyhow::Error),

  #[error("Termination timed out")]
  Timeout(anyhow::Error),

  #[error("Failed joining inner handle")]
  Join(anyhow::Error),
}

impl Worker {
  pub(crate) fn new(
    destination: Destination,
    request_timeout: chrono::Duration,
    termination_timeout: chrono::Duration,
  ) -> Self {
    let (sender, receiver) = flume::unbounded();
    let task = Task::new(destination, receiver, request_timeout);
    let handle = tokio::spawn(task.execute());
    Self {
      sender,
      handle: Arc::new(Mutex::new(Some(handle))),
      termination_timeout: timeout_from_chrono(termination_timeout),
    }
  }
}

impl Worker {
  pub(crate) async fn read<TSpan: Span>(
    &self,
    unit: UnitId,
    span: TSpan,
  ) -> Result<Response, TransportError> {
    let (sender, receiver) = flume::bounded(1);
    let request = TaskRequest::Read {
      unit,
      span: SimpleSpan::from_span(span),
      sender,
    };
    if let Err(error) = self.sender.send_async(request).await {
      return Err(TransportError::ChannelDisconnected(error.into()));
    };

    match receiver.recv_async().await {
      Ok(response) => response,
      Err(error) => Err(TransportError::ChannelDisconnected(error.into())),
    }
  }

  pub(crate) async fn write(
    &self,
    request: WriteRequest,
  ) -> Result<(), TransportError> {
    let (sender, receiver) = flume::bounded(1);
    let request = TaskRequest::Write { request, sender };
    if let Err(error) = self.sender.send_async(request).await {
      return Err(TransportError::ChannelDisconnected(error.into()));
    };

    match receiver.recv_async().await {
      Ok(response) => response,
      Err(error) => Err(TransportError::ChannelDisconnected(error.into())),
    }
  }

  pub(crate) async fn terminate(&self) -> Result<(), TerminateError> {
    let result = self.sender.send_async(TaskRequest::Terminate).await;

    let handle = {
      let mut handle = self.handle.clone().lock_owned().await;
      (*handle).take()
    };
    if let Some(handle) = handle {
      let abort_handle = handle.abort_handle();
      match handle.timeout(self.termination_timeout).await {
        Ok(Ok(_)) => {}
        Err(error) => {
          abort_handle.abort();
          return Err(TerminateError::Timeout(error.into()));
        }
        Ok(Err(error)) => {
          abort_handle.abort();
          return Err(TerminateError::Join(error.into()));
        }
      };
    }

    result.map_err(|error| TerminateError::ChannelDisconnected(error.into()))
  }
}

type TaskHandle = tokio::task::JoinHandle<()>;

type ReadSender = flume::Sender<Result<Response, TransportError>>;
type WriteSender = flume::Sender<Result<(), TransportError>>;

#[derive(Debug)]
enum TaskRequest {
  Read {
    unit: UnitId,
    span: SimpleSpan,
    sender: ReadSender,
  },
  Write {
    request: WriteRequest,
    sender: WriteSender,
  },
  Terminate,
}

type RequestSender = flume::Sender<TaskRequest>;
type RequestReceiver = flume::Receiver<TaskRequest>;

#[derive(Debug)]
struct Task {
  destination: Destination,
  connection: Option<Connection>,
  receiver: RequestReceiver,
  timeout: futures_time::time::Duration,
}

impl Task {
  fn new(
    destination: Destination,
    receiver: RequestReceiver,
    timeout: chrono::Duration,
  ) -> Self {
    Self {
      destination,
      connection: None,
      receiver,
      timeout: timeout_from_chrono(timeout),
    }
  }

  #[tracing::instrument(skip_all, fields(
    host = %self.destination.host,
    port = self.destination.port
  ))]
  async fn execute(mut self) {
    loop {
      let request = match self.receiver.recv_async().await {
        Ok(request) => request,
        Err(flume::RecvError::Disconnected) => return,
      };

      match request {
        TaskRequest::Read { unit, span, sender } => {
          let response = self.read(unit, span).await;
          if let Err(error) = sender.try_send(response) {
            // NOTE: error -> trace because this should fail when we already cancelled the future from caller
            tracing::trace!("Failed sending read response {}", error);
          }
        }
        TaskRequest::Write { request, sender } => {
          let response = self.write(&request).await;
          if let Err(error) = sender.try_send(response) {
            // NOTE: error -> trace because this should fail when we already cancelled the future from caller
            tracing::trace!("Failed sending write response {}", error);
          }
        }
        TaskRequest::Terminate => {
          tracing::trace!("Terminating");
          return;
        }
      }
    }
  }

  async fn read(
    &mut self,
    unit: UnitId,
    span: SimpleSpan,
  ) -> Result<Response, TransportError> {
    let timeout = self.timeout;
    let connection = self.connection().await?;
    let result = connection.read(unit, span, timeout).await;
    self.settle(result)
  }

  async fn write(
    &mut self,
    request: &WriteRequest,
  ) -> Result<(), TransportError> {
    let timeout = self.timeout;
    let connection = self.connection().await?;
    let result = connection.write(request, timeout).await;
    self.settle(result)
  }

  async fn connection(&mut self) -> Result<&mut Connection, ConnectError> {
    let connection = match self.connection.take() {
      Some(connection) => connection,
      None => Connection::connect(&self.destination, self.timeout).await?,
    };

    Ok(self.connection.insert(connection))
  }

  // NOTE: a failed request may leave unread frames on the link so the next
  // request starts from a fresh connection
  fn settle<T>(
    &mut self,
    result: Result<T, RequestError>,
  ) -> Result<T, TransportError> {
    if let Err(error) = &result {
      tracing::debug!("Dropping connection after failed request {}", error);
      self.connection = None;
    }

    Ok(result?)
  }
}

#[cfg(test)]
mod tests {
  use super::super::register::tests::item;
  use super::super::register::FunctionCode;
  use super::*;

  fn closed() -> Destination {
    Destination {
      host: "127.0.0.1".to_string(),
      port: 1,
      framing: Framing::Tcp,
    }
  }

  #[tokio::test]
  async fn read_reports_connect_failures_and_keeps_serving() {
    let worker = Worker::new(
      closed(),
      chrono::Duration::milliseconds(500),
      chrono::Duration::milliseconds(500),
    );
    let item = item(0, FunctionCode::ReadHoldingRegisters);

    for _ in 0..2 {
      let result = worker.read(1, &item).await;
      assert!(matches!(result, Err(TransportError::FailedToConnect(_))));
    }

    assert!(worker.terminate().await.is_ok());
  }

  #[tokio::test]
  async fn requests_after_terminate_fail() {
    let worker = Worker::new(
      closed(),
      chrono::Duration::milliseconds(500),
      chrono::Duration::milliseconds(500),
    );
    assert!(worker.terminate().await.is_ok());

    let result = worker
      .write(WriteRequest {
        unit_id: 1,
        address: 0,
        value: super::super::record::WriteValue::Coil(true),
      })
      .await;
    assert!(matches!(result, Err(TransportError::ChannelDisconnected(_))));
  }
}
