pub mod auth;
pub mod health;
pub mod latency;
pub mod rate_limit;
pub mod routes;
