#[derive(Debug, Clone)]
pub(crate) struct Cloud {
  pub(crate) ssl: bool,
  pub(crate) domain: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Values {
  pub(crate) cloud: Cloud,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
  #[error("Failed reading env var")]
  EnvVarRead(#[from] std::env::VarError),
}

pub(crate) fn parse() -> Result<Values, ParseError> {
  let _ = dotenv::dotenv();

  let values = Values {
    cloud: Cloud {
      ssl: std::env::var("FIELDPOLL_CLOUD_SSL")
        .map_or_else(|_| false, |_| true),
      domain: optional("FIELDPOLL_CLOUD_DOMAIN")?,
    },
  };

  Ok(values)
}

fn optional(key: &str) -> Result<Option<String>, ParseError> {
  match std::env::var(key) {
    Ok(value) if value.is_empty() => Ok(None),
    Ok(value) => Ok(Some(value)),
    Err(std::env::VarError::NotPresent) => Ok(None),
    Err(error) => Err(error.into()),
  }
}
