use thiserror::Error;

/// Errors that can occur while harvesting stats.
///
/// `Cancelled` is not a failure, it signals a cooperative shutdown request
/// and must always unwind to the caller untouched.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("failed to acquire secret material: {0}")]
    Acquisition(String),

    #[error("failed to obtain access token: {0}")]
    Auth(String),

    #[error("request failed after {attempts} attempts: {context}")]
    Request { attempts: u32, context: String },

    #[error("invalid API response: {0}")]
    Validation(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl HarvestError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HarvestError::Cancelled)
    }

    /// Whether this error makes the rest of the pass pointless.
    ///
    /// Without secret material or a token no artist can be fetched, so the
    /// pass is aborted instead of failing once per artist.
    pub fn aborts_pass(&self) -> bool {
        matches!(
            self,
            HarvestError::Acquisition(_) | HarvestError::Auth(_) | HarvestError::Cancelled
        )
    }
}
