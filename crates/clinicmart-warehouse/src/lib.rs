//! Warehouse writers for clinicmart fact and dimension tables.
//!
//! [`PostgresWarehouse`] writes through one transaction per load.
//! [`MemoryWarehouse`] keeps tables in process for dry runs and tests.

#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod writer;

pub use config::WarehouseConfig;
pub use error::WarehouseError;
pub use memory::MemoryWarehouse;
pub use postgres::PostgresWarehouse;
pub use writer::{LoadCounts, Warehouse};
