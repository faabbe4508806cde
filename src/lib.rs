pub mod app;
pub mod chart;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod logging;
pub mod model;
pub mod params;
pub mod poller;
pub mod render;
pub mod ui;
pub mod util;
