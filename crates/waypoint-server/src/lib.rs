pub mod error;
mod routes;
pub mod sse;
pub mod state;

pub use routes::app_router;
pub use state::AppState;
