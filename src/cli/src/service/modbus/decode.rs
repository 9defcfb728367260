use rust_decimal::Decimal;

use super::encoding::*;
use super::register::*;

#[derive(Debug, thiserror::Error)]
pub(crate) enum DecodeError {
  #[error("Function code {code} expects {expected} but got {got}")]
  Shape {
    code: u8,
    expected: &'static str,
    got: &'static str,
  },

  #[error("Response was empty")]
  Empty,

  #[error("Bit {0} is outside of 0-15")]
  BitOutOfRange(u8),

  #[error("Expected {expected} values but got {got}")]
  Count { expected: usize, got: usize },

  #[error("Register value is not representable")]
  Number(#[from] rust_decimal::Error),

  #[error("Register string is not valid utf-8")]
  String(#[from] std::string::FromUtf8Error),
}

/// Decodes a raw read into the value reported for `item`.
///
/// Coil and discrete input reads yield the first bit, or the first
/// `register_count` bits when a count is set. Register reads with a `bit`
/// yield that bit of the single register, counted from the most significant
/// end: bit 0 is `0x8000` and bit 15 is `0x0001`. Other register reads are
/// composed according to the item type and byte order. Floats are carried as
/// exact decimals, so non-finite floats and magnitudes beyond the decimal
/// range (about 7.9e28) fail with [`DecodeError::Number`].
pub(crate) fn decode(
  response: &Response,
  item: &Item,
) -> Result<Value, DecodeError> {
  match (item.function_code.reads_bits(), response) {
    (true, Response::Bits(bits)) => decode_bits(bits, item),
    (false, Response::Registers(registers)) => {
      decode_registers(registers, item)
    }
    (true, Response::Registers(_)) => Err(DecodeError::Shape {
      code: item.function_code.code(),
      expected: "bits",
      got: "registers",
    }),
    (false, Response::Bits(_)) => Err(DecodeError::Shape {
      code: item.function_code.code(),
      expected: "registers",
      got: "bits",
    }),
  }
}

fn decode_bits(bits: &[bool], item: &Item) -> Result<Value, DecodeError> {
  match item.register_count {
    Some(count) => {
      let count = count as usize;
      match bits.get(..count) {
        Some(bits) => Ok(Value::Bits(bits.to_vec())),
        None => Err(DecodeError::Count {
          expected: count,
          got: bits.len(),
        }),
      }
    }
    None => bits.first().copied().map(Value::Bit).ok_or(DecodeError::Empty),
  }
}

pub(crate) fn decode_bit(register: u16, bit: u8) -> Result<bool, DecodeError> {
  if bit > 15 {
    return Err(DecodeError::BitOutOfRange(bit));
  }

  Ok((register >> (15 - bit)) & 1 != 0)
}

macro_rules! decode_integer {
  ($type: ty, $registers: ident, $order: expr) => {{
    let bytes = decode_numeric_bytes($registers, $order);
    let slice = bytes.as_slice().try_into().map_err(|_| DecodeError::Count {
      expected: std::mem::size_of::<$type>() / 2,
      got: $registers.len(),
    })?;
    Value::Number(Decimal::from(<$type>::from_be_bytes(slice)))
  }};
}

macro_rules! decode_floating {
  ($type: ty, $registers: ident, $order: expr) => {{
    let bytes = decode_numeric_bytes($registers, $order);
    let slice = bytes.as_slice().try_into().map_err(|_| DecodeError::Count {
      expected: std::mem::size_of::<$type>() / 2,
      got: $registers.len(),
    })?;
    Value::Number(Decimal::try_from(<$type>::from_be_bytes(slice))?)
  }};
}

fn decode_registers(
  registers: &[u16],
  item: &Item,
) -> Result<Value, DecodeError> {
  if registers.is_empty() {
    return Err(DecodeError::Empty);
  }

  if let Some(bit) = item.bit {
    return match registers {
      [register] => Ok(Value::Bit(decode_bit(*register, bit)?)),
      _ => Err(DecodeError::Count {
        expected: 1,
        got: registers.len(),
      }),
    };
  }

  let order = item.byte_order;
  let value = match item.data_type {
    DataType::U16 => decode_integer!(u16, registers, order),
    DataType::U32 => decode_integer!(u32, registers, order),
    DataType::U64 => decode_integer!(u64, registers, order),
    DataType::S16 => decode_integer!(i16, registers, order),
    DataType::S32 => decode_integer!(i32, registers, order),
    DataType::S64 => decode_integer!(i64, registers, order),
    DataType::F32 => decode_floating!(f32, registers, order),
    DataType::F64 => decode_floating!(f64, registers, order),
    DataType::String => {
      Value::String(String::from_utf8(decode_string_bytes(registers, order))?)
    }
    DataType::Raw => match registers {
      [register] => Value::Register(*register),
      _ => Value::Registers(registers.to_vec()),
    },
  };

  Ok(value)
}
