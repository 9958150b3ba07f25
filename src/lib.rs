pub mod clock;
pub mod config;
pub mod decimal;
pub mod duration;
pub mod format;
pub mod market_data;
pub mod models;
pub mod portfolio;
pub mod report;
pub mod sources;
pub mod symbols;
