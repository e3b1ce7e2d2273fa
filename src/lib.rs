pub mod api;
pub mod boxscore;
pub mod config;
pub mod derive;
pub mod export;
pub mod http_cache;
pub mod http_client;
pub mod model;
pub mod normalize;
pub mod nflverse;
pub mod pipeline;
pub mod raw;
pub mod server;
pub mod source;
pub mod store;
pub mod telemetry;
