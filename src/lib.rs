pub mod catalog;
pub mod config;
pub mod error;
pub mod ident;
pub mod server;
pub mod storage;
