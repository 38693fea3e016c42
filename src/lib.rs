// Library module for the water-resources download backend

pub mod api;
pub mod config;
pub mod error;
pub mod ingestion;
