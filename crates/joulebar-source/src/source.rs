use std::sync::Arc;

use async_trait::async_trait;
use joulebar_core::Snapshot;

use crate::error::FetchError;

/// Anything that can produce a [`Snapshot`] on demand.
///
/// Implementations stamp the snapshot when the response arrives and never
/// retry on their own; retry policy belongs to whoever drives the poll.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Short name used in logs and benchmark output.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Snapshot, FetchError>;
}

#[async_trait]
impl<S: MeasurementSource + ?Sized> MeasurementSource for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        (**self).fetch().await
    }
}

#[async_trait]
impl<S: MeasurementSource + ?Sized> MeasurementSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        (**self).fetch().await
    }
}
