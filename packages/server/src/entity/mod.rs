pub mod attachment;
pub mod todo;
