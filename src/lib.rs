pub mod capture;
pub mod config;
pub mod decoder;
pub mod display;
pub mod encoder;
pub mod pipeline;
pub mod utils;
