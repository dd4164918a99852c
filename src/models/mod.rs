pub mod catalog;
pub mod job;
pub mod menu;
pub mod upload;
