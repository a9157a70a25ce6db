pub mod cache;
pub mod config;
pub mod constants;
pub mod engine;
pub mod extractors;
pub mod logging;
pub mod response;
pub mod routes;
pub mod seed;
pub mod state;
pub mod store;
pub mod workers;
