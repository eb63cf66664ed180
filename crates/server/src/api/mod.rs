//! HTTP handlers, one module per entity.

pub mod alerts;
pub mod common;
pub mod health;
pub mod notifications;
pub mod policies;
pub mod rules;
