// src/lib.rs

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod notifications;
pub mod repository;
pub mod routes;
pub mod state;
pub mod utils;

pub use routes::create_router;
