//! Mathematical utilities: least squares, sparse incidence and normal scores.

pub mod incidence;
pub mod normal;
pub mod ols;

pub use incidence::*;
pub use normal::*;
pub use ols::*;
