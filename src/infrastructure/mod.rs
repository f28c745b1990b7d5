// Infrastructure layer - External dependencies and adapters
pub mod beacon;
pub mod chart_feed;
pub mod config;
pub mod http_gateway;
pub mod realtime;
