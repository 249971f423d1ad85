//! Target-identity management
//!
//! Targets live on their intercept as a list driven by the provisioner:
//! add (or reactivate), withdraw (mark inactive), and a mark-and-sweep
//! resync where every identity must be re-asserted or be removed.

use tracing::info;

use crate::intercept::VoipIntercept;
use crate::sip::SipIdentity;

/// One target identity under an intercept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipTarget {
    pub identity: SipIdentity,
    pub active: bool,
    /// Set during resync; cleared when the provisioner re-asserts the
    /// identity, and swept afterwards if still set
    pub awaiting_confirm: bool,
}

/// Does any active target match this identity? A target without a realm
/// matches any realm.
pub fn target_matches(targets: &[SipTarget], identity: &SipIdentity) -> bool {
    targets.iter().any(|t| {
        t.active
            && t.identity.username == identity.username
            && (t.identity.realm.is_none() || t.identity.realm == identity.realm)
    })
}

/// Add a target, or reactivate and confirm it if already present
pub fn add_target(vint: &mut VoipIntercept, identity: SipIdentity) {
    for target in &mut vint.targets {
        if target.identity == identity {
            if !target.active {
                info!(
                    liid = %vint.liid,
                    target = %target.identity,
                    "collector re-enabled SIP target"
                );
                target.active = true;
            }
            target.awaiting_confirm = false;
            return;
        }
    }

    info!(liid = %vint.liid, target = %identity, "collector received new SIP target");
    vint.targets.push(SipTarget {
        identity,
        active: true,
        awaiting_confirm: false,
    });
}

/// Mark a target inactive; unknown identities are ignored
pub fn withdraw_target(vint: &mut VoipIntercept, identity: &SipIdentity) {
    for target in &mut vint.targets {
        if &target.identity == identity {
            target.active = false;
            target.awaiting_confirm = false;
            info!(
                liid = %vint.liid,
                target = %target.identity,
                "collector is withdrawing SIP target"
            );
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intercept() -> VoipIntercept {
        VoipIntercept::new("LIID1".into(), 1, 0)
    }

    fn alice() -> SipIdentity {
        SipIdentity::new("alice", Some("example.com"))
    }

    #[test]
    fn realm_wildcard_matches_any_realm() {
        let mut vint = intercept();
        add_target(&mut vint, SipIdentity::new("alice", None));

        assert!(target_matches(&vint.targets, &alice()));
        assert!(target_matches(
            &vint.targets,
            &SipIdentity::new("alice", Some("elsewhere.net"))
        ));
        assert!(!target_matches(&vint.targets, &SipIdentity::new("bob", None)));
    }

    #[test]
    fn explicit_realm_must_match() {
        let mut vint = intercept();
        add_target(&mut vint, alice());

        assert!(target_matches(&vint.targets, &alice()));
        assert!(!target_matches(
            &vint.targets,
            &SipIdentity::new("alice", Some("elsewhere.net"))
        ));
    }

    #[test]
    fn withdrawn_target_no_longer_matches_and_can_be_reenabled() {
        let mut vint = intercept();
        add_target(&mut vint, alice());

        withdraw_target(&mut vint, &alice());
        assert!(!target_matches(&vint.targets, &alice()));
        assert_eq!(vint.targets.len(), 1);

        add_target(&mut vint, alice());
        assert!(target_matches(&vint.targets, &alice()));
        assert_eq!(vint.targets.len(), 1, "reactivation must not duplicate");
    }

    #[test]
    fn add_clears_awaiting_confirm() {
        let mut vint = intercept();
        add_target(&mut vint, alice());
        vint.targets[0].awaiting_confirm = true;

        add_target(&mut vint, alice());
        assert!(!vint.targets[0].awaiting_confirm);
    }
}
