use crate::*;

/// First present value among item, device and global levels.
pub(crate) fn resolve<T: Copy>(item: Option<T>, device: Option<T>, global: T) -> T {
  item.or(device).unwrap_or(global)
}

/// Per-device settings after resolving against the global defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DeviceDefaults {
  pub(crate) timeseries_poll_period: chrono::Duration,
  pub(crate) attributes_poll_period: chrono::Duration,
  pub(crate) send_data_only_on_change: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GlobalDefaults {
  pub(crate) poll_period: chrono::Duration,
  pub(crate) send_data_only_on_change: bool,
}

impl GlobalDefaults {
  pub(crate) fn new(config: &config::Modbus) -> Self {
    Self {
      poll_period: config.poll_period,
      send_data_only_on_change: config.send_data_only_on_change,
    }
  }

  pub(crate) fn device(&self, device: &config::Device) -> DeviceDefaults {
    DeviceDefaults {
      timeseries_poll_period: resolve(
        None,
        device.timeseries_poll_period,
        self.poll_period,
      ),
      attributes_poll_period: resolve(
        None,
        device.attributes_poll_period,
        self.poll_period,
      ),
      send_data_only_on_change: resolve(
        None,
        device.send_data_only_on_change,
        self.send_data_only_on_change,
      ),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn most_specific_present_level_wins() {
    assert_eq!(resolve(Some(1), Some(2), 3), 1);
    assert_eq!(resolve(None, Some(2), 3), 2);
    assert_eq!(resolve(None, None, 3), 3);
  }

  #[test]
  fn falsy_values_still_override() {
    assert!(!resolve(Some(false), Some(true), true));
    assert!(!resolve(None, Some(false), true));
    assert_eq!(resolve(Some(0), Some(5), 1000), 0);
    assert_eq!(
      resolve(
        Some(chrono::Duration::zero()),
        None,
        chrono::Duration::seconds(1)
      ),
      chrono::Duration::zero()
    );
  }

  #[test]
  fn device_levels_fall_back_to_globals() {
    let values = config::tests::values(
      r#"
modbus:
  poll_period: 5000
  send_data_only_on_change: true
  servers:
    - transport: { host: localhost, port: 502 }
      devices:
        - unitId: 1
          deviceName: Meter
          timeseriesPollPeriod: 200
          sendDataOnlyOnChange: false
"#,
    );
    let globals = GlobalDefaults::new(&values.modbus);
    let device = globals.device(&values.modbus.servers[0].devices[0]);

    assert_eq!(
      device.timeseries_poll_period,
      chrono::Duration::milliseconds(200)
    );
    assert_eq!(device.attributes_poll_period, chrono::Duration::seconds(5));
    assert!(!device.send_data_only_on_change);
  }
}
