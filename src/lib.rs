pub mod auth;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod routes;
pub mod session;
pub mod storage;
