pub mod batch;
pub mod chat;
pub mod error;
pub mod events;
pub mod export;
pub mod grading;
pub mod images;
pub mod models;
pub mod projects;
pub mod versions;

pub use error::{ErrorKind, LookError, Remedy};
