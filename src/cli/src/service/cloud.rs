use std::time::Duration;

use reqwest::{Client as HttpClient, Error as HttpError};
use thiserror::Error;

use crate::*;

use super::telemetry::{DataKind, Sink, SinkError, Telemetry};

/// Posts telemetry to the cloud over HTTP.
#[derive(Debug, Clone)]
pub(crate) struct Service {
  telemetry_endpoint: String,
  attributes_endpoint: String,
  http: HttpClient,
}

#[derive(Debug, Error)]
pub(crate) enum ConstructionError {
  #[error("Cloud domain is not configured")]
  MissingDomain,

  #[error("HTTP client construction error")]
  HttpError(#[from] HttpError),
}

impl Service {
  pub(crate) fn new(config: &config::Cloud) -> Result<Self, ConstructionError> {
    let domain = match &config.domain {
      Some(domain) => domain,
      None => return Err(ConstructionError::MissingDomain),
    };

    let protocol = if config.ssl { "https" } else { "http" };

    let telemetry_endpoint = format!("{protocol}://{domain}/api/v1/telemetry");
    let attributes_endpoint =
      format!("{protocol}://{domain}/api/v1/attributes");

    let http = HttpClient::builder()
      .timeout(Duration::from_millis(config.timeout.num_milliseconds() as u64))
      .gzip(true)
      .build()?;

    Ok(Self {
      telemetry_endpoint,
      attributes_endpoint,
      http,
    })
  }

  fn endpoint(&self, kind: DataKind) -> &str {
    match kind {
      DataKind::Timeseries => self.telemetry_endpoint.as_str(),
      DataKind::Attribute => self.attributes_endpoint.as_str(),
    }
  }
}

#[async_trait::async_trait]
impl Sink for Service {
  #[tracing::instrument(skip_all, fields(
    device = %telemetry.device_name,
    key = %telemetry.key
  ))]
  async fn emit(&self, telemetry: Telemetry) -> Result<(), SinkError> {
    let http_response = self
      .http
      .post(self.endpoint(telemetry.kind))
      .json(&telemetry)
      .send()
      .await;
    if let Err(error) = &http_response {
      tracing::warn! {
        %error,
        "Failed pushing telemetry {}",
        telemetry.value,
      }
    }
    let http_response = http_response?;

    let status_code = http_response.status();
    if !status_code.is_success() {
      let text = http_response.text().await?;
      return Err(SinkError::Rejected {
        code: status_code.as_u16(),
        text,
      });
    }

    tracing::trace!("Pushed telemetry {:?}", status_code);

    Ok(())
  }
}
