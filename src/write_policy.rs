// src/write_policy.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Write-once versus overwrite semantics, independent of any provider.
//!
//! Backends express `CreateIfAbsent` with their native precondition (GCS
//! generation 0, S3 `If-None-Match: *`, a hard link on the local filesystem)
//! and hand the outcome to [`WriteMode::settle`] together with their own
//! precondition classifier. A lost create race is a successful no-op.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create or replace unconditionally.
    Overwrite,
    /// Fail at the backend if the key exists; treated as success here.
    CreateIfAbsent,
}

impl WriteMode {
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite { WriteMode::Overwrite } else { WriteMode::CreateIfAbsent }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, WriteMode::CreateIfAbsent)
    }

    /// Normalize a backend write outcome.
    ///
    /// With `CreateIfAbsent`, an error classified as a precondition violation
    /// becomes `Ok(())`. Every other error, and every error under `Overwrite`,
    /// is returned as-is.
    pub fn settle<E>(
        self,
        key: &str,
        outcome: Result<(), E>,
        is_precondition_failure: impl Fn(&E) -> bool,
    ) -> Result<(), E> {
        match outcome {
            Err(e) if self.is_conditional() && is_precondition_failure(&e) => {
                debug!("object {} already exists, keeping the existing copy", key);
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum FakeErr {
        Precondition,
        Network,
    }

    fn is_pre(e: &FakeErr) -> bool {
        *e == FakeErr::Precondition
    }

    #[test]
    fn test_create_if_absent_silences_only_precondition() {
        let mode = WriteMode::from_overwrite(false);
        assert!(mode.is_conditional());
        assert_eq!(mode.settle("k", Err(FakeErr::Precondition), is_pre), Ok(()));
        assert_eq!(mode.settle("k", Err(FakeErr::Network), is_pre), Err(FakeErr::Network));
        assert_eq!(mode.settle::<FakeErr>("k", Ok(()), is_pre), Ok(()));
    }

    #[test]
    fn test_overwrite_surfaces_everything() {
        let mode = WriteMode::from_overwrite(true);
        assert!(!mode.is_conditional());
        assert_eq!(
            mode.settle("k", Err(FakeErr::Precondition), is_pre),
            Err(FakeErr::Precondition)
        );
    }
}
