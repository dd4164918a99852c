//! Menu Recognition Service
//!
//! Accepts photos of canteen menus, runs them through an external AI
//! recognizer as background jobs, and reconciles the recognized restaurant
//! and dishes into the PostgreSQL catalog.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
