//! LLM provider implementations.

pub mod fireworks;
