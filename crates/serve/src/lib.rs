pub mod db;
pub mod query;
pub mod summary;

pub use db::{StoreError, ToxStore, TABLE};
