//! Base types and error handling.
//!
//! - [`NetError`]: raw errors returned by transports, codecs and dialers
//! - [`Failure`]: the stable failure taxonomy and its classifier
//! - [`ErrWrapper`]: a classified error tagged with its [`Operation`]

pub mod addr;
pub mod context;
pub mod errwrap;
pub mod failure;
pub mod neterror;

pub use errwrap::{ErrWrapper, Operation};
pub use failure::{classify, Failure};
pub use neterror::NetError;
