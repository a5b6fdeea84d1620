// Car-auction search aggregator

pub mod aggregator;
pub mod auth_middleware;
pub mod config;
pub mod connector;
pub mod ebay;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod routes;
pub mod state;
pub mod store;
pub mod vocabulary;
