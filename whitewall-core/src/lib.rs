pub mod config;
pub mod error;
pub mod error_utils;
pub mod policy;
pub mod types;

pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use policy::*;
pub use types::*;
