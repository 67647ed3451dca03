pub mod analytics;
pub mod dispatch;
pub mod fanout;
pub mod lifecycle;
