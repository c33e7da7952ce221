//! HTTP handlers of the harness services

pub mod app;
pub mod health;
pub mod secondary;
