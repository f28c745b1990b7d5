// Presentation layer - HTTP view surface
pub mod app_state;
pub mod handlers;
