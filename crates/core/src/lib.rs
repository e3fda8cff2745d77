//! Pure domain logic of the ledgerdoc asset engine.
//!
//! Nothing in this crate touches storage: the executors are generic over the
//! transaction context, and the access enforcer works on documents handed to
//! it by the caller.

pub mod access;
pub mod asset;
pub mod error;
pub mod function;
pub mod keys;
pub mod patch;
pub mod policy;
pub mod query;
pub mod reference;
pub mod stage;
