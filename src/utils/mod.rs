//! Small shared helpers: JSON extraction and id generation.

pub mod id_generator;
pub mod json_ext;
