//! Invoice extraction pipeline: image preparation, the vision-model call,
//! and recovery of a structured document from the model's free-form reply.

pub mod cache;
pub mod image;
pub mod parser;
pub mod prompts;
pub mod types;
pub mod vision;
