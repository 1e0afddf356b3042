pub mod addrindexd;
pub mod address;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod page;
pub mod processing;
pub mod resolver;
pub mod spend;
pub mod store;
