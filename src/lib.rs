pub mod config;
pub mod extractors;
pub mod logging;
pub mod middleware;
pub mod perception;
pub mod response;
pub mod routes;
pub mod state;
pub mod tracking;
pub mod workers;
