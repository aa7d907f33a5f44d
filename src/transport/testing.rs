//! Connectors for unit tests.

use parking_lot::Mutex;
use tokio::io::DuplexStream;

use super::link::{BoxFuture, Link, LinkConnector};
use crate::error::{PfodError, Result};

/// Hands out pre-made duplex links, one per `open()`.
pub struct DuplexConnector {
    links: Mutex<Vec<DuplexStream>>,
}

impl DuplexConnector {
    pub fn new(links: Vec<DuplexStream>) -> Self {
        Self {
            links: Mutex::new(links),
        }
    }
}

impl LinkConnector for DuplexConnector {
    fn open(&self) -> BoxFuture<'_, Result<Link>> {
        Box::pin(async move {
            self.links
                .lock()
                .pop()
                .map(|stream| Link::from_stream("duplex", stream))
                .ok_or_else(|| PfodError::LinkSelection("no link".into()))
        })
    }
}
