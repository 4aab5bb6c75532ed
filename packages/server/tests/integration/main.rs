mod attachment;
mod common;
mod todo;
