pub mod cancel;
pub mod config;
pub mod error;
pub mod stats;
pub mod traits;
pub mod types;

pub use cancel::CancellationFlag;
pub use config::*;
pub use error::*;
pub use traits::*;
pub use types::*;
