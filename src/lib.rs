//! Content Reliability Engine
//!
//! This library provides the core functionality for the content-reliability
//! system: an asynchronous job engine for long-running AI operations
//! (translation, SEO generation, tagging, image generation) and a
//! polymorphic reliability-scoring engine with a checksummed audit trail.

pub mod app_state;
pub mod config;
pub mod db;
pub mod jobs;
pub mod models;
pub mod reliability;
pub mod services;
