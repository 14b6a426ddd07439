pub mod config;
pub mod dashboard;
pub mod driver;
pub mod error;
pub mod fleet;
pub mod monitor;
pub mod scheduler;
pub mod scripts;
pub mod shutdown;
pub mod sim;
pub mod target;
pub mod worker;
