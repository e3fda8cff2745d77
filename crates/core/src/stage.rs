//! Lifecycle points at which business-logic hooks fire.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A point in an asset's lifecycle.
///
/// Hooks registered for a stage receive `(pre, post)` documents; see the
/// lifecycle module for which document each stage observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    FirstCreate,
    BeforeCreate,
    AfterCreate,
    FirstUpdate,
    BeforeUpdate,
    AfterUpdate,
    AfterGet,
    BeforeQuery,
    AfterQuery,
    BeforeDelete,
    AfterResolve,
    PatchCreate,
    PatchUpdate,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Self::FirstCreate,
        Self::BeforeCreate,
        Self::AfterCreate,
        Self::FirstUpdate,
        Self::BeforeUpdate,
        Self::AfterUpdate,
        Self::AfterGet,
        Self::BeforeQuery,
        Self::AfterQuery,
        Self::BeforeDelete,
        Self::AfterResolve,
        Self::PatchCreate,
        Self::PatchUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstCreate => "FirstCreate",
            Self::BeforeCreate => "BeforeCreate",
            Self::AfterCreate => "AfterCreate",
            Self::FirstUpdate => "FirstUpdate",
            Self::BeforeUpdate => "BeforeUpdate",
            Self::AfterUpdate => "AfterUpdate",
            Self::AfterGet => "AfterGet",
            Self::BeforeQuery => "BeforeQuery",
            Self::AfterQuery => "AfterQuery",
            Self::BeforeDelete => "BeforeDelete",
            Self::AfterResolve => "AfterResolve",
            Self::PatchCreate => "PatchCreate",
            Self::PatchUpdate => "PatchUpdate",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| CoreError::BadRequest(format!("Invalid stage: '{s}'")))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
