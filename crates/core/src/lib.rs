pub mod config;
pub mod error;
pub mod response;
pub mod sample;
pub mod tag;

pub use config::Config;
pub use error::*;
pub use response::*;
pub use sample::*;
pub use tag::*;
