pub mod tokens;
pub mod translate;

pub use translate::{TranslateOutcome, translate};
