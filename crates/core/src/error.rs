//! Error type shared by every ledgerdoc crate.
//!
//! Each variant maps onto a status class (see [`Status`]) that callers use to
//! translate a failure into a response code. Wrapping an error with
//! [`ResultExt::context`] builds a readable step chain while keeping the
//! class of the innermost failure.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    UnprocessableEntity(String),

    /// One or more references point at assets that do not exist.
    #[error("refs failed: {}", .0.join(","))]
    BrokenReferences(Vec<String>),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{step}: {source}")]
    Context {
        step: String,
        #[source]
        source: Box<CoreError>,
    },

    /// Failure annotated with the caller's tracing payload.
    #[error("{source} {payload}")]
    Traced {
        #[source]
        source: Box<CoreError>,
        payload: String,
    },
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    UnprocessableEntity,
    Internal,
}

impl Status {
    /// HTTP-like numeric code.
    pub fn code(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::UnprocessableEntity => 422,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::UnprocessableEntity => "UNPROCESSABLE_ENTITY",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CoreError {
    /// Status class of the innermost error.
    pub fn status(&self) -> Status {
        match self {
            Self::BadRequest(_) | Self::BrokenReferences(_) | Self::Json(_) => Status::BadRequest,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::Conflict(_) => Status::Conflict,
            Self::UnprocessableEntity(_) => Status::UnprocessableEntity,
            Self::Internal(_) => Status::Internal,
            Self::Context { source, .. } | Self::Traced { source, .. } => source.status(),
        }
    }

    /// Wrap with a step description.
    pub fn context(self, step: impl Into<String>) -> Self {
        Self::Context {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Append the caller's tracing payload to the message.
    ///
    /// The payload is rendered as compact JSON with the `trace` switch
    /// itself removed. The status class is unchanged.
    pub fn with_trace(self, payload: &Value) -> Self {
        let payload = match payload {
            Value::Object(map) => {
                let mut map = map.clone();
                map.remove("trace");
                Value::Object(map).to_string()
            }
            other => other.to_string(),
        };
        Self::Traced {
            source: Box::new(self),
            payload,
        }
    }

    /// Innermost error of a context chain.
    pub fn root(&self) -> &CoreError {
        match self {
            Self::Context { source, .. } | Self::Traced { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Adds step descriptions to fallible results.
pub trait ResultExt<T> {
    fn context(self, step: impl Into<String>) -> Result<T, CoreError>;

    fn with_context<S: Into<String>>(self, step: impl FnOnce() -> S) -> Result<T, CoreError>;
}

impl<T, E: Into<CoreError>> ResultExt<T> for Result<T, E> {
    fn context(self, step: impl Into<String>) -> Result<T, CoreError> {
        self.map_err(|e| e.into().context(step))
    }

    fn with_context<S: Into<String>>(self, step: impl FnOnce() -> S) -> Result<T, CoreError> {
        self.map_err(|e| e.into().context(step()))
    }
}
