pub mod completion;
pub mod load_config;
