use thiserror::Error;

use crate::ports::task_store::StoreError;
use crate::registry::RegistryError;

/// Errors surfaced to callers of a claim cycle.
///
/// Routine contention (version conflicts) is absorbed into statistics and
/// never appears here; what does appear ends the whole cycle.
#[derive(Debug, Error)]
pub enum SpindleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
