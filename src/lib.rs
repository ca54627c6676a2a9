pub mod accessory;
pub mod catalog;
pub mod config;
pub mod error;
pub mod landmarks;
pub mod placement;
pub mod render;
pub mod session;
pub mod shapes;
pub mod smoothing;
pub mod snapshot;
pub mod tracking;
pub mod video;
