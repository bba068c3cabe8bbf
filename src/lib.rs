pub mod bus;
pub mod config;
pub mod error;
pub mod identity;
pub mod server;
pub mod storage;
pub mod swap;

pub use error::SwapdbError;
pub use identity::ProcessIdentity;
pub use storage::StorageHandle;
pub use swap::{SwapCoordinator, SwapOutcome};
