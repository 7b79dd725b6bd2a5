use thiserror::Error;

#[derive(Debug, Error)]
pub enum OddsError {
    /// Persisted swap list could not be read at startup.
    #[error("swap store load failed: {0:#}")]
    Load(anyhow::Error),

    /// Write-through of the swap list failed; in-memory state was rolled back.
    #[error("swap store write failed: {0:#}")]
    Persist(anyhow::Error),
}
