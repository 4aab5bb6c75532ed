pub mod attachment;
pub mod shared;
pub mod todo;
