//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use reelcheck_core::ReelcheckError;
use reelcheck_store::PgStoreError;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Invalid parameter (interval, threshold, identifier).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Video cannot be opened or decoded.
/// Maps to EX_DATAERR from sysexits.h.
pub const MEDIA_UNREADABLE: i32 = 65;

/// Store unavailable; the step can be retried.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const STORE_UNAVAILABLE: i32 = 69;

/// Store state contradicts the ledger invariants.
/// Maps to EX_SOFTWARE from sysexits.h.
pub const INVARIANT_VIOLATION: i32 = 70;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(|cause| {
                if let Some(e) = cause.downcast_ref::<ReelcheckError>() {
                    Some(Self::for_engine_error(e))
                } else {
                    cause.downcast_ref::<PgStoreError>().map(|e| match e {
                        PgStoreError::Invariant(_) => INVARIANT_VIOLATION,
                        _ => STORE_UNAVAILABLE,
                    })
                }
            })
            .unwrap_or(GENERAL_ERROR);

        Self {
            code,
            message: Some(format!("{err:#}")),
        }
    }

    fn for_engine_error(err: &ReelcheckError) -> i32 {
        match err {
            ReelcheckError::InvalidParameter(_) => USAGE_ERROR,
            ReelcheckError::MediaUnreadable(_) => MEDIA_UNREADABLE,
            ReelcheckError::StoreUnavailable(_) => STORE_UNAVAILABLE,
            ReelcheckError::InvariantViolation(_) => INVARIANT_VIOLATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn code_of(err: impl std::error::Error + Send + Sync + 'static) -> i32 {
        let err = anyhow::Error::new(err).context("Failed to check submission");
        ExitCode::from_anyhow(&err).code
    }

    #[test]
    fn test_engine_errors_map_to_sysexits() {
        assert_eq!(code_of(ReelcheckError::InvalidParameter("x".into())), USAGE_ERROR);
        assert_eq!(code_of(ReelcheckError::MediaUnreadable("x".into())), MEDIA_UNREADABLE);
        assert_eq!(code_of(ReelcheckError::StoreUnavailable("x".into())), STORE_UNAVAILABLE);
        assert_eq!(
            code_of(ReelcheckError::InvariantViolation("x".into())),
            INVARIANT_VIOLATION
        );
    }

    #[test]
    fn test_store_errors_map_through_engine_taxonomy() {
        assert_eq!(code_of(PgStoreError::Connection("refused".into())), STORE_UNAVAILABLE);
        assert_eq!(code_of(PgStoreError::Invariant("x".into())), INVARIANT_VIOLATION);
    }

    #[test]
    fn test_unclassified_error_is_general() {
        let err = Err::<(), _>(std::io::Error::other("disk full"))
            .context("Failed to write output")
            .unwrap_err();
        let exit = ExitCode::from_anyhow(&err);
        assert_eq!(exit.code, GENERAL_ERROR);
        assert!(exit.message.unwrap().contains("disk full"));
    }
}
