//! HTTP API handlers

mod health;
mod jobs;
mod search;
mod upload;

pub use health::health_routes;
pub use jobs::job_routes;
pub use search::search_routes;
pub use upload::upload_routes;
