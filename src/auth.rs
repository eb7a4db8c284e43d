//! Auth-domain identifiers, claim sets, and credential models.

pub mod claims;
pub mod credential;
pub mod id;

pub use claims::*;
pub use credential::*;
pub use id::*;
