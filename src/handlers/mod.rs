pub mod admin;
pub mod dispatch;
