pub(crate) mod common;
pub mod cors;
pub mod health;
pub mod models;
pub mod turns;
