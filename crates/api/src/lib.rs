pub mod auth;
pub mod schema;
pub mod storage;
pub mod workflow;
