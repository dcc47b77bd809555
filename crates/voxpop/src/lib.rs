pub mod community;
pub mod config;
pub mod demands;
pub mod graph;
pub mod ingest;
pub mod model;
pub mod provider;
pub mod relate;
