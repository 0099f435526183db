pub mod auth;
pub mod export;
pub mod image;
pub mod llm;
pub mod narrative;
pub mod pipeline;
pub mod prompt;
pub mod setup;
pub mod upload;
