pub mod attachment;
pub mod health;
pub mod todo;
