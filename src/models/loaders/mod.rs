pub mod json_loader;

pub use json_loader::{load_quiz_payload, parse_quiz_payload};
