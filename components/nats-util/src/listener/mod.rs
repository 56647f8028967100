pub mod drain;
pub mod format;
pub mod subscribe;
