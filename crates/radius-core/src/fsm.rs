//! Access session state machine
//!
//! Pure transition function: given the current state, the message code and
//! the accounting status (when the message is an accounting exchange),
//! produce the next state and the action to emit. Any pairing not in the
//! table leaves the state unchanged and emits nothing. `Over` is terminal.

use crate::parser::{AcctStatusType, RadiusCode};
use crate::session::{AccessAction, SessionState};

/// Apply one message to a session state.
pub fn apply_fsm(
    state: SessionState,
    code: RadiusCode,
    acct_status: Option<AcctStatusType>,
) -> (SessionState, Option<AccessAction>) {
    use RadiusCode as C;
    use SessionState::*;
    type T = AcctStatusType;

    match (state, code, acct_status) {
        (New, C::AccessRequest, _) | (New, C::AccountingRequest, Some(T::Start)) => {
            (Authing, Some(AccessAction::Attempt))
        }
        (New, C::AccountingResponse, Some(T::InterimUpdate)) => {
            (Active, Some(AccessAction::AlreadyActive))
        }
        (Authing, C::AccessReject, _) => (Over, Some(AccessAction::Reject)),
        (Authing, C::AccessChallenge, _) => (Authing, Some(AccessAction::Retry)),
        (Authing, C::AccountingRequest, Some(T::Stop)) => (Over, Some(AccessAction::Failed)),
        (Authing, C::AccessAccept, _) | (Authing, C::AccountingResponse, Some(T::Start)) => {
            (Active, Some(AccessAction::Accept))
        }
        (Active, C::AccountingResponse, Some(T::Start))
        | (Active, C::AccountingResponse, Some(T::InterimUpdate)) => {
            (Active, Some(AccessAction::InterimUpdate))
        }
        (Active, C::AccountingResponse, Some(T::Stop)) => (Over, Some(AccessAction::End)),
        _ => (state, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AcctStatusType as T;
    use RadiusCode as C;
    use SessionState as S;

    #[test]
    fn happy_path_transitions() {
        let (s, a) = apply_fsm(S::New, C::AccessRequest, None);
        assert_eq!((s, a), (S::Authing, Some(AccessAction::Attempt)));

        let (s, a) = apply_fsm(S::Authing, C::AccessAccept, None);
        assert_eq!((s, a), (S::Active, Some(AccessAction::Accept)));

        let (s, a) = apply_fsm(S::Active, C::AccountingResponse, Some(T::Stop));
        assert_eq!((s, a), (S::Over, Some(AccessAction::End)));
    }

    #[test]
    fn reject_and_challenge() {
        let (s, a) = apply_fsm(S::Authing, C::AccessReject, None);
        assert_eq!((s, a), (S::Over, Some(AccessAction::Reject)));

        let (s, a) = apply_fsm(S::Authing, C::AccessChallenge, None);
        assert_eq!((s, a), (S::Authing, Some(AccessAction::Retry)));
    }

    #[test]
    fn accounting_driven_attempt_and_accept() {
        let (s, a) = apply_fsm(S::New, C::AccountingRequest, Some(T::Start));
        assert_eq!((s, a), (S::Authing, Some(AccessAction::Attempt)));

        let (s, a) = apply_fsm(S::Authing, C::AccountingResponse, Some(T::Start));
        assert_eq!((s, a), (S::Active, Some(AccessAction::Accept)));

        let (s, a) = apply_fsm(S::Authing, C::AccountingRequest, Some(T::Stop));
        assert_eq!((s, a), (S::Over, Some(AccessAction::Failed)));
    }

    #[test]
    fn late_join_goes_straight_to_active() {
        let (s, a) = apply_fsm(S::New, C::AccountingResponse, Some(T::InterimUpdate));
        assert_eq!((s, a), (S::Active, Some(AccessAction::AlreadyActive)));
    }

    #[test]
    fn interim_updates_keep_session_active() {
        for status in [T::Start, T::InterimUpdate] {
            let (s, a) = apply_fsm(S::Active, C::AccountingResponse, Some(status));
            assert_eq!((s, a), (S::Active, Some(AccessAction::InterimUpdate)));
        }
    }

    #[test]
    fn over_is_terminal() {
        for code in [
            C::AccessRequest,
            C::AccessAccept,
            C::AccessReject,
            C::AccountingRequest,
            C::AccountingResponse,
            C::AccessChallenge,
        ] {
            for status in [None, Some(T::Start), Some(T::Stop), Some(T::InterimUpdate)] {
                let (s, a) = apply_fsm(S::Over, code, status);
                assert_eq!(s, S::Over);
                assert_eq!(a, None);
            }
        }
    }

    #[test]
    fn unmatched_events_are_ignored() {
        let (s, a) = apply_fsm(S::New, C::AccessAccept, None);
        assert_eq!((s, a), (S::New, None));

        let (s, a) = apply_fsm(S::Authing, C::AccessRequest, None);
        assert_eq!((s, a), (S::Authing, None));

        let (s, a) = apply_fsm(S::Active, C::AccessRequest, None);
        assert_eq!((s, a), (S::Active, None));
    }
}
