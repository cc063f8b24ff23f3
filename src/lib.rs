pub mod config;
pub mod error;
pub mod logging;
pub mod pdf;
pub mod pipeline;
pub mod raster;
pub mod store;
pub mod transparency;
