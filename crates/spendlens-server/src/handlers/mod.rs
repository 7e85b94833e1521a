//! API request handlers

pub mod export;
pub mod health;
pub mod manage;
pub mod summary;
pub mod transactions;

pub use export::*;
pub use health::*;
pub use manage::*;
pub use summary::*;
pub use transactions::*;
