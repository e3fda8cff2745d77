//! Schema-driven asset engine on top of a key/value ledger.
//!
//! Assets are JSON documents validated against versioned registry schemas.
//! Every request runs the asset lifecycle with business hooks, reference
//! checking and role-based access control inside one ledger transaction.

pub mod blogic;
pub mod config;
pub mod context;
pub mod engine;
pub mod functions;
pub mod identity;
pub mod ids;
pub mod lifecycle;
pub mod registry;
pub mod resolver;
pub mod router;

pub use config::{Configuration, ConfigurationBuilder, EngineSettings};
pub use context::TxContext;
pub use engine::{Engine, Request};
pub use ids::IdFunc;
pub use lifecycle::{Mode, QueryOutput};
pub use router::Operation;
