pub mod context;
pub mod error;
pub mod error_utils;
pub mod runtime;
pub mod settings;
pub mod types;

pub use context::*;
pub use error::*;
pub use error_utils::*;
pub use runtime::*;
pub use types::*;
