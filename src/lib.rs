// src/lib.rs
pub mod agent;
pub mod config;
pub mod ipinfo;
pub mod load_balancer;
pub mod metrics;
pub mod proxy;
pub mod server;
