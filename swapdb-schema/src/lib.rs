pub mod swap;

pub use swap::{CandidateNameError, SwapMessage};
