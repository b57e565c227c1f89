pub mod api;
pub mod models;

mod extractors;
mod suppliers;
mod utils;
