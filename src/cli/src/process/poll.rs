use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;

use crate::service::{change, modbus, telemetry};
use crate::*;

use super::resolve::{resolve, GlobalDefaults};
use super::schedule::{Callback, JobHandle, Scheduler};

/// One item with every overridable setting resolved.
#[derive(Clone, Debug)]
pub(crate) struct Job {
  pub(crate) item: modbus::Item,
  pub(crate) poll_period: chrono::Duration,
  pub(crate) change_only: bool,
  pub(crate) kind: telemetry::DataKind,
  pub(crate) device: Arc<config::Device>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Outcome {
  Emitted,
  Unchanged,
}

#[derive(Debug, Error)]
pub(crate) enum PollError {
  #[error("Transport read failed")]
  Transport(#[from] modbus::TransportError),

  #[error("Decoding response failed")]
  Decode(#[from] modbus::DecodeError),

  #[error("Sink rejected telemetry")]
  Sink(#[from] telemetry::SinkError),
}

/// Reads, decodes, filters and forwards the value of one job per tick.
#[derive(Clone)]
pub(crate) struct Executor {
  transport: Arc<dyn modbus::Transport>,
  sink: Arc<dyn telemetry::Sink>,
  filter: change::Filter,
  host: String,
  port: u16,
}

impl Executor {
  pub(crate) fn new(
    transport: Arc<dyn modbus::Transport>,
    sink: Arc<dyn telemetry::Sink>,
    filter: change::Filter,
    host: String,
    port: u16,
  ) -> Self {
    Self {
      transport,
      sink,
      filter,
      host,
      port,
    }
  }

  #[tracing::instrument(skip_all, fields(
    device = %job.device.name,
    kind = %job.kind,
    address = job.item.address
  ))]
  pub(crate) async fn on_tick(&self, job: &Job) -> Result<Outcome, PollError> {
    let response = self.transport.read(&job.item, job.device.unit_id).await?;
    let value = modbus::decode(&response, &job.item)?;

    if job.change_only {
      let key = change::Key {
        host: self.host.clone(),
        port: self.port,
        unit: job.device.unit_id,
        kind: job.kind,
        address: job.item.address,
      };
      if !self.filter.check_and_update(key, &value).await {
        return Ok(Outcome::Unchanged);
      }
    }

    self
      .sink
      .emit(telemetry::Telemetry {
        device_name: job.device.name.clone(),
        kind: job.kind,
        key: job.item.key(),
        value,
        timestamp: chrono::Utc::now(),
      })
      .await?;

    Ok(Outcome::Emitted)
  }

  fn callback(&self, job: Job) -> Callback {
    let executor = self.clone();
    let job = Arc::new(job);
    Arc::new(move || {
      let executor = executor.clone();
      let job = job.clone();
      async move {
        match executor.on_tick(&job).await {
          Ok(outcome) => tracing::trace!(?outcome, "Polled"),
          Err(error) => tracing::warn! {
            %error,
            device = %job.device.name,
            address = job.item.address,
            "Poll failed"
          },
        }
      }
      .boxed()
    })
  }
}

/// Registers one recurring job per timeseries and attribute item of `server`.
///
/// Items whose period can't be scheduled are logged and skipped.
#[tracing::instrument(skip_all, fields(host = %server.transport.host, port = server.transport.port))]
pub(crate) async fn register_all(
  server: &config::Server,
  globals: GlobalDefaults,
  executor: &Executor,
  scheduler: &dyn Scheduler,
) -> Vec<JobHandle> {
  if server.devices.is_empty() {
    tracing::warn!("No devices configured for server");
    return Vec::new();
  }

  let mut handles = Vec::new();
  for device in &server.devices {
    let defaults = globals.device(device);
    let device = Arc::new(device.clone());

    let items = device
      .timeseries
      .iter()
      .map(|item| (telemetry::DataKind::Timeseries, item))
      .chain(
        device
          .attributes
          .iter()
          .map(|item| (telemetry::DataKind::Attribute, item)),
      );
    for (kind, item) in items {
      let device_period = match kind {
        telemetry::DataKind::Timeseries => defaults.timeseries_poll_period,
        telemetry::DataKind::Attribute => defaults.attributes_poll_period,
      };
      let job = Job {
        item: item.clone(),
        poll_period: resolve(item.poll_period, None, device_period),
        change_only: resolve(
          item.send_data_only_on_change,
          None,
          defaults.send_data_only_on_change,
        ),
        kind,
        device: device.clone(),
      };

      let interval = match job.poll_period.to_std() {
        Ok(interval) => interval,
        Err(error) => {
          tracing::error! {
            %error,
            device = %device.name,
            address = item.address,
            "Invalid poll period {}",
            job.poll_period
          };
          continue;
        }
      };

      match scheduler
        .add_interval_job(executor.callback(job), interval, true)
        .await
      {
        Ok(handle) => handles.push(handle),
        Err(error) => tracing::error! {
          %error,
          device = %device.name,
          address = item.address,
          "Failed scheduling poll job"
        },
      }
    }
  }

  tracing::debug!("Registered {} poll jobs", handles.len());

  handles
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use tokio::sync::Mutex;

  use super::*;
  use crate::process::schedule::ScheduleError;
  use crate::service::modbus::register::tests::item;
  use crate::service::modbus::{FunctionCode, Response, Value};

  /// Replays `responses`, repeating the last one, after failing the first
  /// `failures` reads.
  struct FakeTransport {
    responses: Mutex<Vec<Response>>,
    failures: AtomicUsize,
  }

  impl FakeTransport {
    fn new(responses: Vec<Response>) -> Arc<Self> {
      Self::failing(0, responses)
    }

    fn failing(failures: usize, mut responses: Vec<Response>) -> Arc<Self> {
      responses.reverse();
      Arc::new(Self {
        responses: Mutex::new(responses),
        failures: AtomicUsize::new(failures),
      })
    }
  }

  fn take_failure(failures: &AtomicUsize) -> bool {
    failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
        left.checked_sub(1)
      })
      .is_ok()
  }

  #[async_trait::async_trait]
  impl modbus::Transport for FakeTransport {
    async fn read(
      &self,
      _item: &modbus::Item,
      _unit: modbus::UnitId,
    ) -> Result<Response, modbus::TransportError> {
      if take_failure(&self.failures) {
        return Err(modbus::TransportError::ChannelDisconnected(
          anyhow::anyhow!("link down"),
        ));
      }
      let mut responses = self.responses.lock().await;
      let response = if responses.len() > 1 {
        responses.pop()
      } else {
        responses.last().cloned()
      };
      response.ok_or_else(|| {
        modbus::TransportError::ChannelDisconnected(anyhow::anyhow!(
          "no response"
        ))
      })
    }

    async fn write(
      &self,
      _request: modbus::WriteRequest,
    ) -> Result<(), modbus::TransportError> {
      Ok(())
    }
  }

  /// Records emitted telemetry after rejecting the first `failures` values.
  #[derive(Default)]
  struct FakeSink {
    emitted: Mutex<Vec<telemetry::Telemetry>>,
    failures: AtomicUsize,
  }

  impl FakeSink {
    fn failing(failures: usize) -> Arc<Self> {
      Arc::new(Self {
        emitted: Mutex::new(Vec::new()),
        failures: AtomicUsize::new(failures),
      })
    }
  }

  #[async_trait::async_trait]
  impl telemetry::Sink for FakeSink {
    async fn emit(
      &self,
      telemetry: telemetry::Telemetry,
    ) -> Result<(), telemetry::SinkError> {
      if take_failure(&self.failures) {
        return Err(telemetry::SinkError::Rejected {
          code: 503,
          text: "unavailable".to_string(),
        });
      }
      self.emitted.lock().await.push(telemetry);
      Ok(())
    }
  }

  #[derive(Default)]
  struct FakeScheduler {
    jobs: Mutex<Vec<(std::time::Duration, bool)>>,
    callbacks: Mutex<Vec<Callback>>,
  }

  #[async_trait::async_trait]
  impl Scheduler for FakeScheduler {
    async fn add_interval_job(
      &self,
      callback: Callback,
      interval: std::time::Duration,
      run_immediately: bool,
    ) -> Result<JobHandle, ScheduleError> {
      self.jobs.lock().await.push((interval, run_immediately));
      self.callbacks.lock().await.push(callback);
      Ok(JobHandle {
        id: uuid::Uuid::new_v4(),
      })
    }
  }

  fn device(unit_id: modbus::UnitId) -> config::Device {
    config::Device {
      unit_id,
      name: "meter".to_string(),
      timeseries: Vec::new(),
      attributes: Vec::new(),
      attributes_poll_period: None,
      timeseries_poll_period: None,
      send_data_only_on_change: None,
      configuration: Vec::new(),
    }
  }

  fn job(item: modbus::Item, change_only: bool) -> Job {
    Job {
      item,
      poll_period: chrono::Duration::seconds(1),
      change_only,
      kind: telemetry::DataKind::Timeseries,
      device: Arc::new(device(1)),
    }
  }

  fn executor(
    transport: Arc<FakeTransport>,
    sink: Arc<FakeSink>,
  ) -> Executor {
    Executor::new(
      transport,
      sink,
      change::Filter::default(),
      "10.0.0.2".to_string(),
      502,
    )
  }

  #[tokio::test]
  async fn decodes_the_most_significant_bit_first() {
    let mut bit_item = item(7, FunctionCode::ReadHoldingRegisters);
    bit_item.bit = Some(0);

    let sink = Arc::new(FakeSink::default());
    let executor = executor(
      FakeTransport::new(vec![Response::Registers(vec![0b1000_0000_0000_0000])]),
      sink.clone(),
    );
    assert_eq!(
      executor.on_tick(&job(bit_item, false)).await.unwrap(),
      Outcome::Emitted
    );

    let emitted = sink.emitted.lock().await;
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].value, Value::Bit(true));
    assert_eq!(emitted[0].key, "7");
    assert_eq!(emitted[0].device_name, "meter");
  }

  #[tokio::test]
  async fn zero_register_decodes_false_at_every_bit() {
    let sink = Arc::new(FakeSink::default());
    let executor = executor(
      FakeTransport::new(vec![Response::Registers(vec![0])]),
      sink.clone(),
    );

    for bit in 0..16 {
      let mut bit_item = item(7, FunctionCode::ReadInputRegisters);
      bit_item.bit = Some(bit);
      executor.on_tick(&job(bit_item, false)).await.unwrap();
    }

    let emitted = sink.emitted.lock().await;
    assert_eq!(emitted.len(), 16);
    assert!(emitted.iter().all(|value| value.value == Value::Bit(false)));
  }

  #[tokio::test]
  async fn change_only_emits_on_first_and_changed_values() {
    let sink = Arc::new(FakeSink::default());
    let executor = executor(
      FakeTransport::new(vec![
        Response::Registers(vec![1]),
        Response::Registers(vec![1]),
        Response::Registers(vec![2]),
      ]),
      sink.clone(),
    );
    let job = job(item(3, FunctionCode::ReadHoldingRegisters), true);

    let mut outcomes = Vec::new();
    for _ in 0..3 {
      outcomes.push(executor.on_tick(&job).await.unwrap());
    }

    assert_eq!(
      outcomes,
      vec![Outcome::Emitted, Outcome::Unchanged, Outcome::Emitted]
    );
    assert_eq!(sink.emitted.lock().await.len(), 2);
  }

  #[tokio::test]
  async fn without_change_only_every_tick_emits() {
    let sink = Arc::new(FakeSink::default());
    let executor = executor(
      FakeTransport::new(vec![Response::Bits(vec![true, false])]),
      sink.clone(),
    );
    let job = job(item(3, FunctionCode::ReadCoils), false);

    for _ in 0..3 {
      executor.on_tick(&job).await.unwrap();
    }

    assert_eq!(sink.emitted.lock().await.len(), 3);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn overlapping_ticks_emit_once() {
    let sink = Arc::new(FakeSink::default());
    let executor = executor(
      FakeTransport::new(vec![Response::Registers(vec![42])]),
      sink.clone(),
    );
    let job = Arc::new(job(item(3, FunctionCode::ReadInputRegisters), true));

    let ticks = (0..16)
      .map(|_| {
        let executor = executor.clone();
        let job = job.clone();
        tokio::spawn(async move { executor.on_tick(&job).await.unwrap() })
      })
      .collect::<Vec<_>>();
    for tick in ticks {
      tick.await.unwrap();
    }

    assert_eq!(sink.emitted.lock().await.len(), 1);
  }

  #[tokio::test]
  async fn decode_failures_do_not_emit() {
    let sink = Arc::new(FakeSink::default());
    let executor = executor(
      FakeTransport::new(vec![Response::Bits(vec![true])]),
      sink.clone(),
    );
    let job = job(item(3, FunctionCode::ReadHoldingRegisters), false);

    assert!(matches!(
      executor.on_tick(&job).await,
      Err(PollError::Decode(_))
    ));
    assert!(sink.emitted.lock().await.is_empty());
  }

  #[tokio::test]
  async fn sink_failures_still_record_the_value() {
    let sink = FakeSink::failing(1);
    let executor = executor(
      FakeTransport::new(vec![
        Response::Registers(vec![1]),
        Response::Registers(vec![1]),
        Response::Registers(vec![2]),
      ]),
      sink.clone(),
    );
    let job = job(item(3, FunctionCode::ReadHoldingRegisters), true);

    assert!(matches!(
      executor.on_tick(&job).await,
      Err(PollError::Sink(_))
    ));
    assert_eq!(executor.on_tick(&job).await.unwrap(), Outcome::Unchanged);
    assert_eq!(executor.on_tick(&job).await.unwrap(), Outcome::Emitted);

    let emitted = sink.emitted.lock().await;
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].value, Value::Register(2));
  }

  #[tokio::test]
  async fn transport_failures_only_cost_one_tick() {
    let sink = Arc::new(FakeSink::default());
    let executor = executor(
      FakeTransport::failing(1, vec![Response::Registers(vec![9])]),
      sink.clone(),
    );
    let callback =
      executor.callback(job(item(3, FunctionCode::ReadInputRegisters), false));

    callback().await;
    assert!(sink.emitted.lock().await.is_empty());
    callback().await;

    let emitted = sink.emitted.lock().await;
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].value, Value::Register(9));
  }

  #[tokio::test]
  async fn registered_jobs_carry_resolved_filtering_and_kind() {
    let mut filtered = device(1);
    filtered.name = "filtered".to_string();
    filtered.send_data_only_on_change = Some(true);
    filtered.timeseries = vec![{
      let mut always = item(1, FunctionCode::ReadInputRegisters);
      always.send_data_only_on_change = Some(false);
      always
    }];
    filtered.attributes = vec![item(2, FunctionCode::ReadHoldingRegisters)];

    let mut unfiltered = device(2);
    unfiltered.name = "unfiltered".to_string();
    unfiltered.timeseries = vec![item(3, FunctionCode::ReadInputRegisters)];
    unfiltered.attributes = vec![{
      let mut changes = item(4, FunctionCode::ReadHoldingRegisters);
      changes.send_data_only_on_change = Some(true);
      changes
    }];

    let server = config::Server {
      transport: config::Transport {
        host: "10.0.0.2".to_string(),
        port: 502,
        framing: modbus::Framing::Tcp,
        timeout: None,
      },
      devices: vec![filtered, unfiltered],
    };
    let globals = GlobalDefaults {
      poll_period: chrono::Duration::seconds(1),
      send_data_only_on_change: false,
    };
    let scheduler = FakeScheduler::default();
    let sink = Arc::new(FakeSink::default());
    let executor = executor(
      FakeTransport::new(vec![Response::Registers(vec![5])]),
      sink.clone(),
    );

    register_all(&server, globals, &executor, &scheduler).await;
    for callback in scheduler.callbacks.lock().await.iter() {
      callback().await;
      callback().await;
    }

    let emitted = sink
      .emitted
      .lock()
      .await
      .iter()
      .map(|telemetry| {
        (telemetry.device_name.clone(), telemetry.kind, telemetry.key.clone())
      })
      .collect::<Vec<_>>();
    let expected = [
      ("filtered", telemetry::DataKind::Timeseries, "1"),
      ("filtered", telemetry::DataKind::Timeseries, "1"),
      ("filtered", telemetry::DataKind::Attribute, "2"),
      ("unfiltered", telemetry::DataKind::Timeseries, "3"),
      ("unfiltered", telemetry::DataKind::Timeseries, "3"),
      ("unfiltered", telemetry::DataKind::Attribute, "4"),
    ]
    .map(|(device, kind, key)| (device.to_string(), kind, key.to_string()))
    .to_vec();
    assert_eq!(emitted, expected);
  }

  #[tokio::test]
  async fn registers_every_item_with_resolved_periods() {
    let mut meter = device(1);
    meter.timeseries_poll_period = Some(chrono::Duration::milliseconds(200));
    meter.timeseries = vec![item(1, FunctionCode::ReadInputRegisters), {
      let mut fast = item(2, FunctionCode::ReadInputRegisters);
      fast.poll_period = Some(chrono::Duration::milliseconds(50));
      fast
    }];
    meter.attributes = vec![item(3, FunctionCode::ReadHoldingRegisters)];

    let server = config::Server {
      transport: config::Transport {
        host: "10.0.0.2".to_string(),
        port: 502,
        framing: modbus::Framing::Tcp,
        timeout: None,
      },
      devices: vec![meter, device(2)],
    };
    let globals = GlobalDefaults {
      poll_period: chrono::Duration::seconds(1),
      send_data_only_on_change: false,
    };
    let scheduler = FakeScheduler::default();
    let executor = executor(
      FakeTransport::new(Vec::new()),
      Arc::new(FakeSink::default()),
    );

    let handles = register_all(&server, globals, &executor, &scheduler).await;

    assert_eq!(handles.len(), 3);
    assert_eq!(
      *scheduler.jobs.lock().await,
      vec![
        (std::time::Duration::from_millis(200), true),
        (std::time::Duration::from_millis(50), true),
        (std::time::Duration::from_millis(1000), true),
      ]
    );
  }

  #[tokio::test]
  async fn empty_servers_register_nothing() {
    let server = config::Server {
      transport: config::Transport {
        host: "10.0.0.2".to_string(),
        port: 502,
        framing: modbus::Framing::Tcp,
        timeout: None,
      },
      devices: Vec::new(),
    };
    let scheduler = FakeScheduler::default();
    let executor = executor(
      FakeTransport::new(Vec::new()),
      Arc::new(FakeSink::default()),
    );
    let globals = GlobalDefaults {
      poll_period: chrono::Duration::seconds(1),
      send_data_only_on_change: false,
    };

    assert!(register_all(&server, globals, &executor, &scheduler)
      .await
      .is_empty());
    assert!(scheduler.jobs.lock().await.is_empty());
  }
}
