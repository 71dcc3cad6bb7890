pub mod connection;
pub mod dispatch;
pub mod listener;
pub mod pump;
