// ABOUTME: MySQL client tooling module
// ABOUTME: Connection arguments and live catalog lookups through the query tool

pub mod catalog;
pub mod connection;

pub use catalog::{Catalog, MysqlClient};
pub use connection::{ConnectionProfile, ConnectionSettings};
