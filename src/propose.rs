use crate::ProposeError;
use crate::atomize::AtomicChange;
use crate::plan::SuggestedCommit;

/// Turns ordered atomic changes into proposed commits.
///
/// Implementations are not trusted: whatever they return goes through
/// [`Plan::validate`](crate::plan::Plan::validate) before anything touches
/// the repository.
pub trait CommitProposer {
    fn propose(&self, changes: &[AtomicChange]) -> Result<Vec<SuggestedCommit>, ProposeError>;
}

/// One commit per atomic change, in atomizer order
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProposer;

impl CommitProposer for DefaultProposer {
    fn propose(&self, changes: &[AtomicChange]) -> Result<Vec<SuggestedCommit>, ProposeError> {
        Ok(changes
            .iter()
            .map(|change| SuggestedCommit {
                id: change.id.clone(),
                title: change
                    .summary
                    .clone()
                    .unwrap_or_else(|| "Atomic change".to_string()),
                body: None,
                atomic_change_ids: vec![change.id.clone()],
                hunk_ids: change.hunk_ids.clone(),
                risk: None,
            })
            .collect())
    }
}
