use std::{collections::HashMap, fmt::Display, sync::Arc};

use tokio::sync::Mutex;

use crate::*;

use super::modbus::{UnitId, Value};
use super::telemetry::DataKind;

/// Change history slot of one polled value.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) struct Key {
  pub(crate) host: String,
  pub(crate) port: u16,
  pub(crate) unit: UnitId,
  pub(crate) kind: DataKind,
  pub(crate) address: u16,
}

impl Display for Key {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}|{}|{}|{}|{}",
      self.host, self.port, self.unit, self.kind, self.address
    )
  }
}

/// Last reported value per [`Key`].
///
/// Entries live as long as the filter and are never pruned.
#[derive(Clone, Debug, Default)]
pub(crate) struct Filter {
  values: Arc<Mutex<HashMap<Key, Value>>>,
}

impl service::Service for Filter {
  fn new(_config: config::Values) -> Self {
    Self::default()
  }
}

impl Filter {
  /// Stores `value` and returns `true` when it is the first or a different
  /// value for `key`.
  #[tracing::instrument(skip(self, value), fields(key = %key))]
  pub(crate) async fn check_and_update(&self, key: Key, value: &Value) -> bool {
    let mut values = self.values.lock().await;
    match values.get(&key) {
      Some(previous) if previous == value => {
        tracing::debug!("Value {} didn't change", value);
        false
      }
      _ => {
        tracing::debug!("Value {} changed", value);
        values.insert(key, value.clone());
        true
      }
    }
  }

  pub(crate) async fn len(&self) -> usize {
    self.values.lock().await.len()
  }
}
