// Bridge module - THE FACADE
// Transport-agnostic connection state, command dispatch and event fan-in

mod connectivity;
mod error;
mod state;

pub use connectivity::*;
pub use error::*;
pub use state::*;
