//! JSON Schema definitions for the structured output the scoring model must
//! return.

pub mod clickbait;
