pub(crate) mod client;
pub(crate) mod headers;

pub(crate) use client::{ClientRequest, exchange};

use fleetlink_client::ports::SinkError;

#[derive(Debug)]
pub enum Error {
    Closed,
    Parse,
    FormatHeaders,
    /// The response sink refused a body slice.
    Aborted(SinkError),
}

impl From<core::fmt::Error> for Error {
    fn from(_error: core::fmt::Error) -> Self {
        Error::FormatHeaders
    }
}
