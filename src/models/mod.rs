//! Data models

mod certificate;
mod domain;

pub use certificate::*;
pub use domain::*;
