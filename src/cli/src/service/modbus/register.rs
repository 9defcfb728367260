use std::fmt::Display;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio_modbus::{Address, Quantity};

use super::span::Span;

pub(crate) type UnitId = u8;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub(crate) enum FunctionCode {
  ReadCoils,
  ReadDiscreteInputs,
  ReadHoldingRegisters,
  ReadInputRegisters,
}

impl FunctionCode {
  pub(crate) fn code(self) -> u8 {
    match self {
      FunctionCode::ReadCoils => 1,
      FunctionCode::ReadDiscreteInputs => 2,
      FunctionCode::ReadHoldingRegisters => 3,
      FunctionCode::ReadInputRegisters => 4,
    }
  }

  pub(crate) fn reads_bits(self) -> bool {
    matches!(
      self,
      FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs
    )
  }
}

/// Order in which the bytes of a multi-register value arrive.
///
/// Letters name the bytes of the value from most to least significant, so
/// `Big` is ABCD and `LittleSwap` is CDAB.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq)]
pub(crate) enum ByteOrder {
  #[default]
  Big,
  Little,
  BigSwap,
  LittleSwap,
}

#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq)]
pub(crate) enum DataType {
  #[default]
  Raw,
  U16,
  U32,
  U64,
  S16,
  S32,
  S64,
  F32,
  F64,
  String,
}

impl DataType {
  /// Register count the type occupies, `None` when it is sized by the item.
  pub(crate) fn quantity(self) -> Option<Quantity> {
    match self {
      DataType::U16 | DataType::S16 => Some(1),
      DataType::U32 | DataType::S32 | DataType::F32 => Some(2),
      DataType::U64 | DataType::S64 | DataType::F64 => Some(4),
      DataType::Raw | DataType::String => None,
    }
  }
}

/// One polled timeseries or attribute entry of a device.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Item {
  pub(crate) address: Address,
  pub(crate) function_code: FunctionCode,
  pub(crate) byte_order: ByteOrder,
  pub(crate) data_type: DataType,
  pub(crate) bit: Option<u8>,
  pub(crate) register_count: Option<Quantity>,
  pub(crate) poll_period: Option<chrono::Duration>,
  pub(crate) send_data_only_on_change: Option<bool>,
  pub(crate) tag: Option<String>,
}

impl Item {
  pub(crate) fn key(&self) -> String {
    match &self.tag {
      Some(tag) => tag.clone(),
      None => self.address.to_string(),
    }
  }
}

impl Span for Item {
  fn function_code(&self) -> FunctionCode {
    self.function_code
  }

  fn address(&self) -> Address {
    self.address
  }

  fn quantity(&self) -> Quantity {
    if self.function_code.reads_bits() {
      return self.register_count.unwrap_or(1);
    }

    if self.bit.is_some() {
      return 1;
    }

    self
      .data_type
      .quantity()
      .or(self.register_count)
      .unwrap_or(1)
  }
}

impl Span for &Item {
  fn function_code(&self) -> FunctionCode {
    self.function_code
  }

  fn address(&self) -> Address {
    self.address
  }

  fn quantity(&self) -> Quantity {
    <Item as Span>::quantity(self)
  }
}

/// Raw payload of a read, shaped by the function code that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Response {
  Bits(Vec<bool>),
  Registers(Vec<u16>),
}

/// Application level value decoded from a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub(crate) enum Value {
  Bit(bool),
  Bits(Vec<bool>),
  Register(u16),
  Registers(Vec<u16>),
  Number(Decimal),
  String(String),
}

impl Display for Value {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> Result<(), std::fmt::Error> {
    match self {
      Value::Bit(value) => std::fmt::Display::fmt(value, f),
      Value::Bits(value) => std::fmt::Debug::fmt(value, f),
      Value::Register(value) => write!(f, "0x{:04X}", value),
      Value::Registers(value) => f
        .debug_list()
        .entries(value.iter().map(|&num| Hex(num)))
        .finish(),
      Value::Number(value) => std::fmt::Display::fmt(value, f),
      Value::String(value) => std::fmt::Debug::fmt(value, f),
    }
  }
}

struct Hex(u16);

impl std::fmt::Debug for Hex {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "0x{:04X}", self.0)
  }
}
