//! Achievement lifecycle: which events are legal from which status.

use crate::error::WorkflowError;
use crate::model::AchievementStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Submit,
    Verify,
    Reject,
    Edit,
    Delete,
    Attach,
}

impl Transition {
    pub fn action(self) -> &'static str {
        match self {
            Transition::Submit => "submit",
            Transition::Verify => "verify",
            Transition::Reject => "reject",
            Transition::Edit => "update",
            Transition::Delete => "delete",
            Transition::Attach => "attach files to",
        }
    }
}

/// Returns the status reached by applying `event` to an achievement in `from`.
///
/// Editing a rejected achievement reopens it as a draft; every other edit or
/// attachment leaves the status unchanged.
pub fn apply(from: AchievementStatus, event: Transition) -> Result<AchievementStatus, WorkflowError> {
    use AchievementStatus::*;
    let next = match (from, event) {
        (Draft, Transition::Submit) => Some(Submitted),
        (Submitted, Transition::Verify) => Some(Verified),
        (Submitted, Transition::Reject) => Some(Rejected),
        (Draft, Transition::Edit) | (Rejected, Transition::Edit) => Some(Draft),
        (Draft, Transition::Delete) => Some(Deleted),
        (Draft, Transition::Attach) => Some(Draft),
        _ => None,
    };
    next.ok_or(WorkflowError::InvalidState {
        current: from,
        action: event.action(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use AchievementStatus::*;

    const ALL: [AchievementStatus; 5] = [Draft, Submitted, Verified, Rejected, Deleted];
    const EVENTS: [Transition; 6] = [
        Transition::Submit,
        Transition::Verify,
        Transition::Reject,
        Transition::Edit,
        Transition::Delete,
        Transition::Attach,
    ];

    #[test]
    fn legal_edges() {
        assert_eq!(apply(Draft, Transition::Submit).unwrap(), Submitted);
        assert_eq!(apply(Submitted, Transition::Verify).unwrap(), Verified);
        assert_eq!(apply(Submitted, Transition::Reject).unwrap(), Rejected);
        assert_eq!(apply(Rejected, Transition::Edit).unwrap(), Draft);
        assert_eq!(apply(Draft, Transition::Edit).unwrap(), Draft);
        assert_eq!(apply(Draft, Transition::Delete).unwrap(), Deleted);
        assert_eq!(apply(Draft, Transition::Attach).unwrap(), Draft);
    }

    #[test]
    fn verified_and_deleted_are_terminal() {
        for event in EVENTS {
            assert!(apply(Verified, event).is_err());
            assert!(apply(Deleted, event).is_err());
        }
    }

    #[test]
    fn verify_on_draft_is_invalid_state() {
        let err = apply(Draft, Transition::Verify).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidState {
                current: Draft,
                action: "verify"
            }
        ));
    }

    #[test]
    fn only_drafts_accept_attachments() {
        for status in ALL {
            assert_eq!(apply(status, Transition::Attach).is_ok(), status == Draft);
        }
    }
}
