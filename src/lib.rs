pub mod config;
pub mod errors;
pub mod guide;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod recorder;
pub mod scan;
pub mod sources;
pub mod utils;
