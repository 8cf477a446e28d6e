// Provider client implementations

pub mod claude;

pub use claude::ClaudeClient;
