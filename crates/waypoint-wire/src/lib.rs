pub mod agent_output;
pub mod http;
pub mod patch;

pub use agent_output::*;
pub use http::*;
pub use patch::*;
