pub mod filters;

pub use filters::{MessageFilter, is_greeting, is_signature};
