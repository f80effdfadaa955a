// Declare modules at the root level
pub mod activation;
pub mod alerts;
pub mod consumption;
pub mod cursor;
pub mod domain;
pub mod error;
pub mod id_generator;
pub mod refresh;
pub mod reports;
pub mod session;
pub mod tariff;
pub mod time;
pub mod validators;

// Test utilities module (available in test and integration test builds)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export everything under a shared namespace for external access
pub mod shared {
    pub use super::activation;
    pub use super::alerts;
    pub use super::consumption;
    pub use super::cursor;
    pub use super::domain;
    pub use super::error;
    pub use super::id_generator;
    pub use super::refresh;
    pub use super::reports;
    pub use super::session;
    pub use super::tariff;
    pub use super::time;
    pub use super::validators;
}

// Also re-export at root for convenience
pub use activation::*;
pub use alerts::*;
pub use consumption::*;
pub use cursor::*;
pub use domain::*;
pub use error::*;
pub use id_generator::*;
pub use refresh::*;
pub use reports::*;
pub use session::*;
pub use tariff::*;
pub use time::*;
pub use validators::*;
