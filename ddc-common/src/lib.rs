pub mod bus;
pub mod error;
pub mod geo;
pub mod index;
pub mod kv;
pub mod logging;
pub mod lww;
pub mod model;
pub mod settings;
pub mod zones;

pub use error::{AppError, Result};
