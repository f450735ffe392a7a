pub mod addrs;
pub mod broadcast;
pub mod constants;
pub mod exec;
pub mod fs;
pub mod iface;
pub mod logger;
pub mod network;
pub mod render;
pub mod settings;
pub mod validate;

#[cfg(test)]
pub(crate) mod fakes;
