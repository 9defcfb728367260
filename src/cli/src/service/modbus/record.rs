use tokio_modbus::{Address, Quantity};

use super::register::UnitId;

/// Value written by a [`WriteRequest`].
///
/// Each variant maps onto one Modbus write function: single coil (5),
/// multiple coils (15), single register (6) and multiple registers (16).
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) enum WriteValue {
  Coil(bool),
  Coils(Vec<bool>),
  Register(u16),
  Registers(Vec<u16>),
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) struct WriteRequest {
  pub(crate) unit_id: UnitId,
  pub(crate) address: Address,
  pub(crate) value: WriteValue,
}

impl WriteRequest {
  pub(crate) fn function_code(&self) -> u8 {
    match self.value {
      WriteValue::Coil(_) => 5,
      WriteValue::Coils(_) => 15,
      WriteValue::Register(_) => 6,
      WriteValue::Registers(_) => 16,
    }
  }

  pub(crate) fn quantity(&self) -> Quantity {
    match &self.value {
      WriteValue::Coil(_) | WriteValue::Register(_) => 1,
      WriteValue::Coils(values) => values.len() as Quantity,
      WriteValue::Registers(values) => values.len() as Quantity,
    }
  }
}
