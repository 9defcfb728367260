use std::future::Future;

use futures_time::future::FutureExt;
use tokio::net::TcpStream;
use tokio_modbus::{
  client::Context,
  prelude::{Reader, SlaveContext, Writer},
  Slave,
};

use super::record::{WriteRequest, WriteValue};
use super::register::{FunctionCode, Response, UnitId};
use super::span::SimpleSpan;

#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub(crate) enum Framing {
  #[default]
  Tcp,
  RtuOverTcp,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) struct Destination {
  pub(crate) host: String,
  pub(crate) port: u16,
  pub(crate) framing: Framing,
}

#[derive(Debug)]
pub(crate) struct Connection {
  ctx: Context,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectError {
  #[error("Failed to connect")]
  Connect(#[from] std::io::Error),

  #[error("Connecting timed out")]
  Timeout(std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RequestError {
  #[error("Request failed")]
  Io(std::io::Error),

  #[error("Request timed out")]
  Timeout(std::io::Error),
}

impl Connection {
  #[tracing::instrument(skip_all, fields(host = %destination.host, port = destination.port))]
  pub(crate) async fn connect(
    destination: &Destination,
    timeout: futures_time::time::Duration,
  ) -> Result<Self, ConnectError> {
    let stream =
      match TcpStream::connect((destination.host.as_str(), destination.port))
        .timeout(timeout)
        .await
      {
        Ok(stream) => stream?,
        Err(error) => return Err(ConnectError::Timeout(error)),
      };
    let ctx = match destination.framing {
      Framing::Tcp => tokio_modbus::prelude::tcp::attach(stream),
      Framing::RtuOverTcp => tokio_modbus::prelude::rtu::attach(stream),
    };

    tracing::trace!("Connected");

    Ok(Self { ctx })
  }

  pub(crate) async fn read(
    &mut self,
    unit: UnitId,
    span: SimpleSpan,
    timeout: futures_time::time::Duration,
  ) -> Result<Response, RequestError> {
    self.ctx.set_slave(Slave(unit));

    let SimpleSpan {
      function_code,
      address,
      quantity,
    } = span;
    let response = match function_code {
      FunctionCode::ReadCoils => Response::Bits(
        with_timeout(self.ctx.read_coils(address, quantity), timeout).await?,
      ),
      FunctionCode::ReadDiscreteInputs => Response::Bits(
        with_timeout(self.ctx.read_discrete_inputs(address, quantity), timeout)
          .await?,
      ),
      FunctionCode::ReadHoldingRegisters => Response::Registers(
        with_timeout(
          self.ctx.read_holding_registers(address, quantity),
          timeout,
        )
        .await?,
      ),
      FunctionCode::ReadInputRegisters => Response::Registers(
        with_timeout(self.ctx.read_input_registers(address, quantity), timeout)
          .await?,
      ),
    };

    Ok(response)
  }

  pub(crate) async fn write(
    &mut self,
    request: &WriteRequest,
    timeout: futures_time::time::Duration,
  ) -> Result<(), RequestError> {
    self.ctx.set_slave(Slave(request.unit_id));

    let address = request.address;
    match &request.value {
      WriteValue::Coil(value) => {
        with_timeout(self.ctx.write_single_coil(address, *value), timeout)
          .await
      }
      WriteValue::Coils(values) => {
        with_timeout(self.ctx.write_multiple_coils(address, values), timeout)
          .await
      }
      WriteValue::Register(value) => {
        with_timeout(self.ctx.write_single_register(address, *value), timeout)
          .await
      }
      WriteValue::Registers(values) => {
        with_timeout(
          self.ctx.write_multiple_registers(address, values),
          timeout,
        )
        .await
      }
    }
  }
}

async fn with_timeout<T>(
  request: impl Future<Output = std::io::Result<T>>,
  timeout: futures_time::time::Duration,
) -> Result<T, RequestError> {
  match request.timeout(timeout).await {
    Ok(Ok(response)) => Ok(response),
    Ok(Err(error)) => Err(RequestError::Io(error)),
    Err(error) => Err(RequestError::Timeout(error)),
  }
}

pub(crate) fn timeout_from_chrono(
  timeout: chrono::Duration,
) -> futures_time::time::Duration {
  futures_time::time::Duration::from_millis(timeout.num_milliseconds() as u64)
}
