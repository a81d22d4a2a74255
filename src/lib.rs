pub mod aggregator;
pub mod apis;
pub mod config;
pub mod constants;
pub mod db;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod geo;
pub mod logging;
pub mod normalize;
pub mod observability;
pub mod resolver;
pub mod storage;
