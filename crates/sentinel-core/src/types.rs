//! Core domain types for the Trade Sentinel system.

pub mod alert;
pub mod resource;
pub mod risk;
pub mod subject;

pub use alert::*;
pub use resource::*;
pub use risk::*;
pub use subject::*;
