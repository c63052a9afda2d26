//! Request fingerprinting.
//!
//! Every assembly request is identified by an [`AssembledTypeId`]: the requested type plus
//! one optional [`IdPart`] per participant. The type cache maps identifiers to generated
//! types, and the identifier is stamped into each generated type so that it can be
//! recovered after a reload.

mod id;
mod provider;

pub use id::{AssembledTypeId, IdPart};
pub use provider::{IdentifierProvider, TypeIdentifierProvider};
