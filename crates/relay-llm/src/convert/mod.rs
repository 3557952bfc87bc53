//! Conversions between internal types and provider wire formats

pub mod anthropic;
pub mod openai;
