pub mod domain;
pub mod error;
pub mod flags;
pub mod protocol;
