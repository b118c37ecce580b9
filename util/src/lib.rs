pub mod archive;
pub mod config;
pub mod languages;
pub mod paths;
pub mod test_helpers;
pub mod time;
