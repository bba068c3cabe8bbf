pub mod router;
pub mod routes;

pub use router::{AppState, swapdb_router};
