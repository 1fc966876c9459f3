//! Field extraction: catalog of form questions, label matching, value
//! cleanup and completeness checks.

pub mod catalog;
pub mod extractor;
pub mod normalize;
pub mod record;
pub mod validation;

pub use catalog::*;
pub use extractor::*;
pub use normalize::*;
pub use record::*;
pub use validation::*;
