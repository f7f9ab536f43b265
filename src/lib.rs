// Social Graph Engine - relationships, feeds, likes, notifications and messaging

// Core types and primitives
pub mod core;

// Record types shared by the engine and the store
pub mod models;

// Store interface, SQLite implementation, id generation and viewer context
pub mod infrastructure;

// Engine components
pub mod services;

// Facade the calling layer talks to
pub mod engine;

// Common utilities
pub mod config;
pub mod error;

// Re-exports for convenience
pub use config::Config;
pub use engine::SocialEngine;
pub use error::{AppError, AppResult};
pub use infrastructure::ViewerContext;
