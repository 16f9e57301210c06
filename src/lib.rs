pub mod chunker;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod progress;
pub mod prompt;
pub mod render;
pub mod response;
pub mod retry;
pub mod server;
pub mod settings;
pub mod stream;
pub mod tools;
