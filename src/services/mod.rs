pub mod auth;
pub mod catalog;
pub mod mapper;
pub mod memory;
pub mod orchestrator;
pub mod price;
pub mod recognizer;
pub mod reconcile;
pub mod storage;
pub mod store;
pub mod users;
