pub mod connection;
pub mod decode;
pub mod encoding;
pub mod record;
pub mod register;
pub mod service;
pub mod span;
pub mod worker;

pub(crate) use connection::{Destination, Framing};
pub(crate) use decode::{decode, DecodeError};
pub(crate) use record::*;
pub(crate) use register::*;
pub(crate) use service::*;
pub(crate) use worker::TransportError;
