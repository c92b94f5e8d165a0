pub mod app;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod host;
pub mod normalize;
pub mod output;
pub mod planner;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod tables;
