//! [`ActionVerifier`] – rule engine for outbound actions.
//!
//! Before the executor transmits anything, the action passes through
//! [`ActionVerifier::verify`]. Every registered [`Rule`] is evaluated in
//! order; the first violation returns [`WardenError::Policy`] and the action
//! is **not** executed.
//!
//! The prompt builder already steers the decision service away from
//! forbidden bands, but steering is advisory – [`BlacklistRule`] is the
//! enforcement point.

use cellwarden_types::{ActionCommand, BandPlan, WardenError};

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single invariant an action must satisfy before transmission.
pub trait Rule: Send + Sync {
    /// Name used in policy-violation messages.
    fn name(&self) -> &str;

    /// `Ok(())` when the action satisfies the invariant.
    fn check(&self, action: &ActionCommand) -> Result<(), WardenError>;
}

// ────────────────────────────────────────────────────────────────────────────
// ActionVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Validates an [`ActionCommand`] against all registered [`Rule`]s.
///
/// # Example
///
/// ```
/// use cellwarden_kernel::verifier::{ActionVerifier, BlacklistRule};
/// use cellwarden_types::{ActionCommand, BandPlan, RadioTech};
///
/// let mut verifier = ActionVerifier::new();
/// verifier.add_rule(Box::new(BlacklistRule::new(BandPlan::default())));
///
/// let ok = ActionCommand::SetBands { tech: RadioTech::Lte, bands: vec![1, 3] };
/// assert!(verifier.verify(&ok).is_ok());
///
/// let blocked = ActionCommand::SetBands { tech: RadioTech::Lte, bands: vec![1, 28] };
/// assert!(verifier.verify(&blocked).is_err());
/// ```
#[derive(Default)]
pub struct ActionVerifier {
    rules: Vec<Box<dyn Rule>>,
}

impl ActionVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Returns the first violation encountered, or `Ok(())`.
    pub fn verify(&self, action: &ActionCommand) -> Result<(), WardenError> {
        for rule in &self.rules {
            rule.check(action)?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Rejects [`ActionCommand::SetBands`] when any requested band is on the
/// static blacklist for that technology. The whole action is rejected, not
/// trimmed – a partial band lock is not what the decision service asked for.
pub struct BlacklistRule {
    plan: BandPlan,
}

impl BlacklistRule {
    pub fn new(plan: BandPlan) -> Self {
        Self { plan }
    }
}

impl Rule for BlacklistRule {
    fn name(&self) -> &str {
        "band_blacklist"
    }

    fn check(&self, action: &ActionCommand) -> Result<(), WardenError> {
        if let ActionCommand::SetBands { tech, bands } = action {
            let offenders = self.plan.blocked_in(*tech, bands);
            if !offenders.is_empty() {
                return Err(WardenError::Policy {
                    rule: self.name().to_string(),
                    details: format!(
                        "{tech} band(s) {offenders:?} are blacklisted; refusing band lock"
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellwarden_types::RadioTech;

    fn blacklist_verifier() -> ActionVerifier {
        let mut v = ActionVerifier::new();
        v.add_rule(Box::new(BlacklistRule::new(BandPlan::default())));
        v
    }

    #[test]
    fn clean_band_lock_passes() {
        let v = blacklist_verifier();
        let action = ActionCommand::SetBands {
            tech: RadioTech::Lte,
            bands: vec![1, 3, 7],
        };
        assert!(v.verify(&action).is_ok());
    }

    #[test]
    fn single_blacklisted_band_rejects_whole_action() {
        let v = blacklist_verifier();
        let action = ActionCommand::SetBands {
            tech: RadioTech::Lte,
            bands: vec![1, 28, 7],
        };
        let err = v.verify(&action).unwrap_err();
        assert!(matches!(err, WardenError::Policy { ref rule, .. } if rule == "band_blacklist"));
    }

    #[test]
    fn nr5g_blacklist_is_separate_from_lte() {
        let v = blacklist_verifier();
        // Band 78 is fine on LTE…
        assert!(v
            .verify(&ActionCommand::SetBands {
                tech: RadioTech::Lte,
                bands: vec![78],
            })
            .is_ok());
        // …but blacklisted on NR5G.
        assert!(v
            .verify(&ActionCommand::SetBands {
                tech: RadioTech::Nr5g,
                bands: vec![78],
            })
            .is_err());
    }

    #[test]
    fn non_band_actions_are_not_subject_to_the_blacklist() {
        let v = blacklist_verifier();
        assert!(v.verify(&ActionCommand::RestartModem).is_ok());
        assert!(v.verify(&ActionCommand::FullScan).is_ok());
        assert!(v.verify(&ActionCommand::Wait { minutes: 5 }).is_ok());
    }

    #[test]
    fn empty_verifier_always_passes() {
        let v = ActionVerifier::new();
        let action = ActionCommand::SetBands {
            tech: RadioTech::Nr5g,
            bands: vec![28, 78],
        };
        assert!(v.verify(&action).is_ok());
    }
}
