use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::modbus::Value;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize)]
pub(crate) enum DataKind {
  #[serde(rename = "ts")]
  Timeseries,
  #[serde(rename = "atr")]
  Attribute,
}

impl Display for DataKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DataKind::Timeseries => f.write_str("ts"),
      DataKind::Attribute => f.write_str("atr"),
    }
  }
}

/// One decoded value on its way out of the gateway.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Telemetry {
  pub(crate) device_name: String,
  pub(crate) kind: DataKind,
  pub(crate) key: String,
  pub(crate) value: Value,
  pub(crate) timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SinkError {
  #[error("HTTP Post error")]
  Http(#[from] reqwest::Error),

  #[error("Telemetry rejected with code {code}: {text}")]
  Rejected { code: u16, text: String },
}

#[async_trait::async_trait]
pub(crate) trait Sink: Send + Sync {
  async fn emit(&self, telemetry: Telemetry) -> Result<(), SinkError>;
}

/// Reports telemetry as log events.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Log;

#[async_trait::async_trait]
impl Sink for Log {
  async fn emit(&self, telemetry: Telemetry) -> Result<(), SinkError> {
    tracing::info! {
      device = %telemetry.device_name,
      kind = %telemetry.kind,
      key = %telemetry.key,
      value = %telemetry.value,
      timestamp = %telemetry.timestamp,
      "Telemetry"
    };

    Ok(())
  }
}
