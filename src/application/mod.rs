// Application layer - Live buffering, chart lifecycle and the view controller
pub mod chart_renderer;
pub mod live_buffer;
pub mod sensor_gateway;
pub mod surface;
pub mod view_controller;

#[cfg(test)]
pub(crate) mod test_support;
