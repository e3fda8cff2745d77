//! Request entry point.
//!
//! [`Engine`] opens one ledger transaction per request, runs the operation
//! through [`router::dispatch`], and commits the transaction only when an
//! invoke succeeds. Queries are always rolled back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgerdoc_core::asset::Object;
use ledgerdoc_core::error::CoreError;
use ledgerdoc_store::Ledger;
use serde_json::Value;

use crate::config::Configuration;
use crate::context::TxContext;
use crate::router::{self, Operation};

/// Key of the payload switch that appends the payload to error messages.
const TRACE_KEY: &str = "trace";

/// Caller-supplied envelope of one request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Raw client certificate the fingerprint is derived from.
    pub certificate: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    /// Raw operation payload, echoed into errors when it sets `"trace": true`.
    pub trace: Option<Value>,
}

impl Request {
    pub fn new(certificate: impl Into<Vec<u8>>, timestamp: DateTime<Utc>) -> Self {
        Self {
            certificate: certificate.into(),
            timestamp,
            trace: None,
        }
    }

    pub fn with_trace(mut self, payload: Value) -> Self {
        self.trace = Some(payload);
        self
    }

    fn annotate(&self, err: CoreError) -> CoreError {
        match &self.trace {
            Some(payload) if payload.get(TRACE_KEY).and_then(Value::as_bool) == Some(true) => {
                err.with_trace(payload)
            }
            _ => err,
        }
    }
}

pub struct Engine<L: Ledger> {
    ledger: L,
    config: Arc<Configuration>,
}

impl<L: Ledger> Engine<L> {
    pub fn new(ledger: L, config: Configuration) -> Self {
        Self {
            ledger,
            config: Arc::new(config),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Run `op` and commit its writes when it succeeds.
    pub fn invoke(&self, request: &Request, op: Operation) -> Result<Value, CoreError> {
        self.run(request, op, true)
    }

    /// Run `op` and discard its writes.
    pub fn query(&self, request: &Request, op: Operation) -> Result<Value, CoreError> {
        self.run(request, op, false)
    }

    /// Parse a JSON payload and route it to [`Engine::query`] or
    /// [`Engine::invoke`] by method.
    ///
    /// The payload doubles as the request's trace payload unless one is set.
    pub fn handle(&self, request: &Request, payload: Value) -> Result<Value, CoreError> {
        let request = match request.trace {
            Some(_) => request.clone(),
            None => request.clone().with_trace(payload.clone()),
        };
        let op = Operation::from_value(payload).map_err(|e| request.annotate(e))?;
        if op.is_query() {
            self.query(&request, op)
        } else {
            self.invoke(&request, op)
        }
    }

    /// Apply bootstrap data. See [`crate::registry::init`].
    pub fn init(&self, request: &Request, input: Object) -> Result<Value, CoreError> {
        self.invoke(request, Operation::Init { input })
    }

    fn run(&self, request: &Request, op: Operation, commit: bool) -> Result<Value, CoreError> {
        let method = op.method();
        let stub = self.ledger.transaction(request.timestamp);
        let mut ctx = TxContext::new(Arc::clone(&self.config), stub, &request.certificate);
        tracing::debug!(method, tx_id = %ctx.tx_id(), fingerprint = %ctx.fingerprint(), "request");

        let outcome = router::dispatch(&mut ctx, op).and_then(|response| {
            if commit {
                ctx.into_stub().commit()?;
            }
            Ok(response)
        });

        outcome.map_err(|err| {
            tracing::warn!(method, status = %err.status(), error = %err, "request failed");
            request.annotate(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trace_applies_only_when_switched_on() {
        let now = Utc::now();
        let plain = Request::new(b"cert".to_vec(), now).with_trace(json!({"name": "x"}));
        let err = plain.annotate(CoreError::NotFound("missing".into()));
        assert_eq!(err.to_string(), "missing");

        let traced = Request::new(b"cert".to_vec(), now)
            .with_trace(json!({"trace": true, "name": "x"}));
        let err = traced.annotate(CoreError::NotFound("missing".into()));
        assert_eq!(err.to_string(), r#"missing {"name":"x"}"#);
    }
}
