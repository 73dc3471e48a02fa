pub mod config;
pub mod error;
pub mod logging;
pub mod record;
pub mod report;

pub use error::AppError;
pub use logging::Logger;
pub use report::Advisory;
