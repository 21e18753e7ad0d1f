use thiserror::Error;

/// Failure classes for a conformance run.
///
/// None of these are recovered locally: the first one raised aborts the
/// whole run and surfaces through the step report and the exit status.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Service lookup did not return a usable host.
    #[error("service discovery failed: {0}")]
    Discovery(String),

    /// A credential-exchange step returned a non-success response.
    #[error("credential exchange failed: {0}")]
    Auth(String),

    /// A document API call failed, either at the HTTP level or with a
    /// per-item `Success = false` inside a 200 response.
    #[error("request failed ({status}): {message}")]
    Request { status: u16, message: String },

    /// The verifier observed a mismatch between the service and the model.
    #[error("consistency check failed: {0}")]
    Assertion(String),

    /// An expected-401 probe observed something other than a 401.
    #[error("expected 401 from {endpoint}, got: {outcome}")]
    Authorization { endpoint: String, outcome: String },
}
