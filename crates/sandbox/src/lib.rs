//! Script replay over an in-memory ledger.
//!
//! A script names a set of actors by certificate, optionally runs `init`,
//! then sends each step's payload to the engine as one of those actors.

pub mod script;

pub use script::{Expect, Sandbox, Script, StepOutcome};
