use serde::{Deserialize, Serialize};

use crate::service::modbus;

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Cloud {
  pub(crate) timeout: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum LogLevel {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub(crate) enum FunctionCode {
  ReadCoils,
  ReadDiscreteInputs,
  ReadHoldingRegisters,
  ReadInputRegisters,
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported read function code {0}")]
pub(crate) struct UnsupportedFunctionCode(u8);

impl TryFrom<u8> for FunctionCode {
  type Error = UnsupportedFunctionCode;

  fn try_from(code: u8) -> Result<Self, Self::Error> {
    match code {
      1 => Ok(FunctionCode::ReadCoils),
      2 => Ok(FunctionCode::ReadDiscreteInputs),
      3 => Ok(FunctionCode::ReadHoldingRegisters),
      4 => Ok(FunctionCode::ReadInputRegisters),
      code => Err(UnsupportedFunctionCode(code)),
    }
  }
}

impl From<FunctionCode> for u8 {
  fn from(code: FunctionCode) -> Self {
    match code {
      FunctionCode::ReadCoils => 1,
      FunctionCode::ReadDiscreteInputs => 2,
      FunctionCode::ReadHoldingRegisters => 3,
      FunctionCode::ReadInputRegisters => 4,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum ByteOrder {
  #[default]
  Big,
  Little,
  BigSwap,
  LittleSwap,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub(crate) enum DataType {
  #[default]
  #[serde(rename = "raw")]
  Raw,
  #[serde(rename = "16uint")]
  U16,
  #[serde(rename = "32uint")]
  U32,
  #[serde(rename = "64uint")]
  U64,
  #[serde(rename = "16int")]
  S16,
  #[serde(rename = "32int")]
  S32,
  #[serde(rename = "64int")]
  S64,
  #[serde(rename = "32float")]
  F32,
  #[serde(rename = "64float")]
  F64,
  #[serde(rename = "string")]
  String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Item {
  pub(crate) tag: Option<String>,
  pub(crate) address: u16,
  pub(crate) function_code: FunctionCode,
  #[serde(default)]
  pub(crate) byte_order: ByteOrder,
  #[serde(default, rename = "type")]
  pub(crate) data_type: DataType,
  pub(crate) bit: Option<u8>,
  pub(crate) register_count: Option<u16>,
  pub(crate) poll_period: Option<u32>,
  pub(crate) send_data_only_on_change: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum WriteValue {
  Coil(bool),
  Coils(Vec<bool>),
  Register(u16),
  Registers(Vec<u16>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ValueRegister {
  pub(crate) address: u16,
  pub(crate) value: WriteValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Device {
  pub(crate) unit_id: u8,
  pub(crate) device_name: String,
  #[serde(default)]
  pub(crate) timeseries: Vec<Item>,
  #[serde(default)]
  pub(crate) attributes: Vec<Item>,
  pub(crate) attributes_poll_period: Option<u32>,
  pub(crate) timeseries_poll_period: Option<u32>,
  pub(crate) send_data_only_on_change: Option<bool>,
  #[serde(default)]
  pub(crate) configuration: Vec<ValueRegister>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Framing {
  #[default]
  Tcp,
  RtuOverTcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Transport {
  pub(crate) host: String,
  pub(crate) port: u16,
  #[serde(default)]
  pub(crate) framing: Framing,
  pub(crate) timeout: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Server {
  pub(crate) transport: Transport,
  #[serde(default)]
  pub(crate) devices: Vec<Device>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Modbus {
  pub(crate) request_timeout: Option<u32>,
  pub(crate) termination_timeout: Option<u32>,
  pub(crate) poll_period: Option<u32>,
  pub(crate) send_data_only_on_change: Option<bool>,
  #[serde(default)]
  pub(crate) servers: Vec<Server>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Values {
  pub(crate) log_level: Option<LogLevel>,
  #[serde(default)]
  pub(crate) cloud: Cloud,
  #[serde(default)]
  pub(crate) modbus: Modbus,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
  #[error("Failed creating project directories")]
  MissingProjectDirs,

  #[error("Failed reading config file")]
  Read(#[from] std::io::Error),

  #[error("Config file is missing an extension")]
  MissingExtension,

  #[error("Config file has invalid extension")]
  InvalidExtension,

  #[error("Failed deserializing config from yaml")]
  DeserializetionYaml(#[from] serde_yaml::Error),

  #[error("Failed deserializing config from toml")]
  DeserializetionToml(#[from] toml::de::Error),

  #[error("Failed deserializing config from json")]
  DeserializetionJson(#[from] serde_json::Error),
}

pub(crate) async fn parse_async(
  location: Option<&str>,
) -> Result<Values, ParseError> {
  let location = match location {
    Some(location) => std::path::PathBuf::from(location),
    None => {
      match directories::ProjectDirs::from("com", "altibiz", "fieldpoll") {
        Some(project_dirs) => project_dirs.config_dir().join("config.yaml"),
        None => return Err(ParseError::MissingProjectDirs),
      }
    }
  };

  let raw = tokio::fs::read_to_string(location.clone()).await?;
  let extension = location.extension().and_then(|str| str.to_str());
  parse_str(raw.as_str(), extension)
}

pub(crate) fn parse_str(
  raw: &str,
  extension: Option<&str>,
) -> Result<Values, ParseError> {
  let values = match extension {
    None => return Err(ParseError::MissingExtension),
    Some("yaml" | "yml") => serde_yaml::from_str::<Values>(raw)?,
    Some("toml") => toml::from_str::<Values>(raw)?,
    Some("json") => serde_json::from_str::<Values>(raw)?,
    Some(_) => return Err(ParseError::InvalidExtension),
  };

  Ok(values)
}

pub(crate) fn to_modbus_item(item: Item) -> modbus::Item {
  modbus::Item {
    address: item.address,
    function_code: match item.function_code {
      FunctionCode::ReadCoils => modbus::FunctionCode::ReadCoils,
      FunctionCode::ReadDiscreteInputs => {
        modbus::FunctionCode::ReadDiscreteInputs
      }
      FunctionCode::ReadHoldingRegisters => {
        modbus::FunctionCode::ReadHoldingRegisters
      }
      FunctionCode::ReadInputRegisters => {
        modbus::FunctionCode::ReadInputRegisters
      }
    },
    byte_order: match item.byte_order {
      ByteOrder::Big => modbus::ByteOrder::Big,
      ByteOrder::Little => modbus::ByteOrder::Little,
      ByteOrder::BigSwap => modbus::ByteOrder::BigSwap,
      ByteOrder::LittleSwap => modbus::ByteOrder::LittleSwap,
    },
    data_type: match item.data_type {
      DataType::Raw => modbus::DataType::Raw,
      DataType::U16 => modbus::DataType::U16,
      DataType::U32 => modbus::DataType::U32,
      DataType::U64 => modbus::DataType::U64,
      DataType::S16 => modbus::DataType::S16,
      DataType::S32 => modbus::DataType::S32,
      DataType::S64 => modbus::DataType::S64,
      DataType::F32 => modbus::DataType::F32,
      DataType::F64 => modbus::DataType::F64,
      DataType::String => modbus::DataType::String,
    },
    bit: item.bit,
    register_count: item.register_count,
    poll_period: item.poll_period.map(milliseconds_to_chrono),
    send_data_only_on_change: item.send_data_only_on_change,
    tag: item.tag,
  }
}

pub(crate) fn to_modbus_write_request(
  unit_id: u8,
  register: ValueRegister,
) -> modbus::WriteRequest {
  modbus::WriteRequest {
    unit_id,
    address: register.address,
    value: match register.value {
      WriteValue::Coil(value) => modbus::WriteValue::Coil(value),
      WriteValue::Coils(values) => modbus::WriteValue::Coils(values),
      WriteValue::Register(value) => modbus::WriteValue::Register(value),
      WriteValue::Registers(values) => modbus::WriteValue::Registers(values),
    },
  }
}

pub(crate) fn to_modbus_framing(framing: Framing) -> modbus::Framing {
  match framing {
    Framing::Tcp => modbus::Framing::Tcp,
    Framing::RtuOverTcp => modbus::Framing::RtuOverTcp,
  }
}

pub(crate) fn milliseconds_to_chrono(milliseconds: u32) -> chrono::Duration {
  chrono::Duration::milliseconds(milliseconds as i64)
}
