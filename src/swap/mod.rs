//! Swap coordination: turns broadcast swap requests into storage replacements and runs the
//! deferred takeover on the instance that asked for the swap.

mod coordinator;
mod takeover;

pub use coordinator::{SwapCoordinator, SwapOutcome};
pub use takeover::Takeover;
