pub mod api;
pub mod config;
pub mod db;
pub mod host;
pub mod log;
pub mod plugin;

#[cfg(test)]
mod testing;
