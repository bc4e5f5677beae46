pub mod loaders;
pub mod quiz;
pub mod response;

pub use loaders::{load_quiz_payload, parse_quiz_payload};
pub use quiz::{Question, Quiz, OPTIONS_PER_QUESTION};
pub use response::TakerResponse;
