//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - observation/corrected-variance CSV export (`export`)
//! - fitted model JSON (`model_file`)

pub mod export;
pub mod ingest;
pub mod model_file;

pub use export::*;
pub use ingest::*;
pub use model_file::*;
