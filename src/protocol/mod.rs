pub mod chat;
pub(crate) mod error_shapes;
pub mod turns;
