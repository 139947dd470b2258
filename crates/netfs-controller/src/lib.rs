//! Reconcilers for NetworkFilesystem resources
//!
//! - [`lifecycle`] drives the enable/disable state machine
//! - [`service_sync`] mirrors Service addresses into the record's status
//! - [`attachment`] manages the volume's attachment tickets
//!
//! Both controllers share a [`lifecycle::Context`] and serialize work per
//! record name through [`locks::NameLocks`].

#![deny(missing_docs)]

use std::time::Duration;

use netfs_common::Error;

pub mod attachment;
pub mod client;
pub mod endpoint;
pub mod lifecycle;
pub mod locks;
pub mod service_sync;

pub use client::{KubeClient, KubeClientImpl};
pub use lifecycle::Context;
pub use locks::{NameGuard, NameLocks};

/// Requeue delay for a failed reconciliation, by error class.
///
/// Waiting on another component resolves quickly; API failures get a
/// moderate backoff; shape violations need an operator and are retried
/// slowly.
pub fn requeue_delay(error: &Error) -> Duration {
    match error {
        Error::Waiting { .. } | Error::NotFound { .. } => Duration::from_secs(5),
        Error::EndpointShape { .. } => Duration::from_secs(120),
        e if e.is_retryable() => Duration::from_secs(15),
        _ => Duration::from_secs(60),
    }
}
