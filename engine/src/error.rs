//! Error taxonomy shared by the client algorithms, the JSON-Patch algebra,
//! and the sync controller. The server crate wraps these in its own
//! `AppError` for HTTP/WS surfacing.

use thiserror::Error;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the sync engine can raise. Mirrors the taxonomy in the
/// coordinator's error handling design: every variant names a specific
/// condition a caller must react to, not a generic catch-all.
#[derive(Debug, Error)]
pub enum Error {
    /// The client's `baseRev` is strictly greater than the server's
    /// current rev. The client must discard its local state and reload.
    #[error("client is ahead of server: baseRev={base_rev} but current rev={current_rev}")]
    ClientAheadOfServer { base_rev: u64, current_rev: u64 },

    /// An initial batch (`baseRev == 0`) arrived for a document that
    /// already exists, and was not part of a recognized multi-batch
    /// initial upload.
    #[error("document {doc_id} already exists")]
    DocAlreadyExists { doc_id: String },

    /// A batch of changes carried inconsistent `baseRev` values.
    #[error("batch has inconsistent baseRev values")]
    BaseRevMismatchInBatch,

    /// A merge or update was attempted on a branch that is not open.
    #[error("branch {branch_id} is not open")]
    BranchNotOpen { branch_id: String },

    /// An attempt was made to branch a document that is itself a branch.
    #[error("document {doc_id} is already a branch")]
    BranchOfBranch { doc_id: String },

    /// `apply` or `transform` failed under strict-mode semantics.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// The transport dropped mid-flush. Pending changes are retained.
    #[error("disconnected during flush")]
    Disconnected,

    /// The persistence layer failed to service a call.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A post-commit broadcast failed. The commit itself is not undone.
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    /// A document referenced by id was not found.
    #[error("document {doc_id} not found")]
    DocNotFound { doc_id: String },

    /// A branch referenced by id was not found.
    #[error("branch {branch_id} not found")]
    BranchNotFound { branch_id: String },
}

impl Error {
    /// True for errors that leave the caller's local state intact and
    /// warrant a retry rather than a hard resync.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Disconnected | Error::StoreUnavailable(_) | Error::BroadcastFailed(_)
        )
    }
}
