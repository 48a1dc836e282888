pub mod config;
pub mod containers;
pub mod driver;
pub mod scenario;
pub mod types;

pub use config::Config;
pub use driver::{ConnectionOptions, Driver, DriverRegistry, LoginGeometry, UnknownDriverError};
pub use scenario::Scenario;
