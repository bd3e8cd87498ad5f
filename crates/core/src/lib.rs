pub mod config;
pub mod document;
pub mod error;
pub mod schema;
pub mod settings;

pub use config::Config;
pub use document::*;
pub use error::*;
pub use schema::*;
pub use settings::*;
