// src/portfolio/mod.rs
mod aggregate;
mod calculator;
mod models;
mod service;

pub use aggregate::aggregate;
pub use calculator::{compute, total_value};
pub use models::PortfolioRow;
pub use service::{NoActiveSources, PortfolioService};
