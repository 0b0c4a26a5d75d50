pub mod api;
pub mod arrival;
pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod geo;
pub mod relay;
pub mod server;
