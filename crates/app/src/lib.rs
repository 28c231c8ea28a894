//! Voucher persistence, services and runtime configuration.

pub mod config;
pub mod context;
pub mod database;
pub mod domain;
pub mod observability;

#[cfg(test)]
mod test;
