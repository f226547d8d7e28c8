pub mod auth;
pub mod config;
pub mod constants;
pub mod extractors;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod srs;
pub mod state;
pub mod store;
pub mod validation;
pub mod workers;
