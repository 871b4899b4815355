#![cfg(feature = "rusqlite")]

pub mod helpers;
pub mod model;
mod rusqlite;

pub use helpers::*;
pub use model::model;
pub use rusqlite::*;
