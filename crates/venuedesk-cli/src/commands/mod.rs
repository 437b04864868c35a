pub mod booking;
pub mod common;
pub mod completions;
pub mod contact;
pub mod delete;
pub mod inquiry;
pub mod list;
pub mod sync;
pub mod task;
