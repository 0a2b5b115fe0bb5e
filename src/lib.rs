pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod orchestrator;
pub mod prompts;
pub mod review;
pub mod server;
