//! Task ownership.

use std::future::Future;

use tokio::task::JoinHandle;

/// A spawned task that is aborted when its owner is dropped.
///
/// Every background loop in this crate lives inside one of these, held by
/// the view or engine that started it. Dropping a view therefore stops
/// all of its polling and rotation.
#[derive(Debug)]
pub(crate) struct OwnedTask(JoinHandle<()>);

impl OwnedTask {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for OwnedTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}
