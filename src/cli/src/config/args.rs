#[derive(Debug, Clone, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Values {
  /// Config file (yaml, toml or json) to use instead of the default one
  #[arg(short, long)]
  pub(crate) config: Option<String>,

  /// Log everything down to trace level
  #[arg(short, long)]
  pub(crate) trace: bool,
}

pub(crate) fn parse() -> Values {
  clap::Parser::parse()
}
