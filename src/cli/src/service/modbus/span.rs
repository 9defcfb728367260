use tokio_modbus::{Address, Quantity};

use super::register::FunctionCode;

pub(crate) trait Span {
  fn function_code(&self) -> FunctionCode;

  fn address(&self) -> Address;

  fn quantity(&self) -> Quantity;
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) struct SimpleSpan {
  pub(crate) function_code: FunctionCode,
  pub(crate) address: Address,
  pub(crate) quantity: Quantity,
}

impl SimpleSpan {
  pub(crate) fn from_span<TSpan: Span>(span: TSpan) -> Self {
    Self {
      function_code: span.function_code(),
      address: span.address(),
      quantity: span.quantity(),
    }
  }
}

impl Span for SimpleSpan {
  fn function_code(&self) -> FunctionCode {
    self.function_code
  }

  fn address(&self) -> Address {
    self.address
  }

  fn quantity(&self) -> Quantity {
    self.quantity
  }
}
