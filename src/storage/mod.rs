pub mod db;
mod jobs;
pub mod models;
mod posts;
mod tables;

pub use db::{Database, DatabaseError, PurgeStats};
pub use tables::*;
