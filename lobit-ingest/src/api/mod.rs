//! HTTP API handlers for lobit-ingest

pub mod health;
pub mod index;
pub mod release_workflow;

pub use health::health_routes;
pub use index::index_routes;
pub use release_workflow::release_routes;
