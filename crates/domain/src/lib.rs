pub mod column;
pub mod setting;
