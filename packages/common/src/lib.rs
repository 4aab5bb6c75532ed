pub mod policy;
pub mod storage;
pub mod todo_status;

pub use todo_status::TodoStatus;
