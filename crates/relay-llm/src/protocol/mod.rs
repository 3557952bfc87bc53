//! Wire format types for upstream and downstream APIs

pub mod anthropic;
pub mod openai;
