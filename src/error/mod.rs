mod bus;
mod storage;
mod swapdb;
mod takeover;

pub use bus::BusError;
pub use storage::StorageError;
pub use swapdb::{ApiErrorBody, ApiErrorObject, SwapdbError};
pub use takeover::{TakeoverError, TakeoverStep};

/// Whether an error leaves the process in a state it must not keep running from.
pub trait IsFatal {
    fn is_fatal(&self) -> bool;
}
