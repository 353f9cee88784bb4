pub mod browser;
pub mod http;
pub mod session;
pub mod state;

pub use http::build_router;
pub use state::AppState;
