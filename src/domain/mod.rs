// Domain layer - Dashboard data models
pub mod chart;
pub mod error;
pub mod history;
pub mod metric;
pub mod node;
pub mod push;
pub mod series;
