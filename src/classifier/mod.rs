//! Firmware line classifiers, one per protocol generation.
//!
//! Each classifier turns a received line into zero or more [`MmuDelta`]s.
//! Marker-driven classifiers are expressed as ordered [`MarkerRule`] tables
//! where the first matching rule decides the outcome.

pub mod legacy;
pub mod structured;
pub mod terse;

use mmu_shared::{MmuDelta, MmuState, PrinterProfile};

pub use legacy::LegacyClassifier;
pub use structured::{MmuResponse, ProtocolError, StructuredClassifier};
pub use terse::TerseClassifier;

/// Result of offering one line to a classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not a line this classifier understands.
    Unmatched,
    /// Recognized, but nothing changes (duplicate, suppressed, not actionable).
    Ignored,
    /// Deltas to merge, in order.
    Update(Vec<MmuDelta>),
}

impl Classification {
    pub fn update(delta: MmuDelta) -> Self {
        Classification::Update(vec![delta])
    }

    pub fn deltas(self) -> Vec<MmuDelta> {
        match self {
            Classification::Update(deltas) => deltas,
            _ => Vec::new(),
        }
    }

    pub fn is_unmatched(&self) -> bool {
        matches!(self, Classification::Unmatched)
    }
}

pub trait LineClassifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn classify(&self, mmu: &MmuState, line: &str) -> Classification;
}

/// How a rule recognizes its line.
#[derive(Clone, Copy)]
pub enum Marker {
    /// Any of the phrases occurs in the line.
    Contains(&'static [&'static str]),
    Pattern(fn(&str) -> bool),
}

impl Marker {
    fn matches(&self, line: &str) -> bool {
        match self {
            Marker::Contains(phrases) => phrases.iter().any(|p| line.contains(p)),
            Marker::Pattern(pattern) => pattern(line),
        }
    }
}

/// One entry of a classifier's priority table.
#[derive(Clone, Copy)]
pub struct MarkerRule {
    pub name: &'static str,
    pub marker: Marker,
    /// Extra precondition on the current state.
    pub when: fn(&MmuState) -> bool,
    pub apply: fn(&MmuState, &str) -> Classification,
}

impl MarkerRule {
    fn matches(&self, mmu: &MmuState, line: &str) -> bool {
        (self.when)(mmu) && self.marker.matches(line)
    }
}

pub(crate) fn always(_: &MmuState) -> bool {
    true
}

/// Applies the first rule in `rules` that matches.
pub(crate) fn first_match(rules: &[MarkerRule], mmu: &MmuState, line: &str) -> Classification {
    match rules.iter().find(|rule| rule.matches(mmu, line)) {
        Some(rule) => {
            tracing::debug!("Line matched rule '{}': {}", rule.name, line);
            (rule.apply)(mmu, line)
        }
        None => Classification::Unmatched,
    }
}

static MK3_CHAIN: [&dyn LineClassifier; 2] = [&StructuredClassifier, &LegacyClassifier];
static TERSE_CHAIN: [&dyn LineClassifier; 1] = [&TerseClassifier];

/// Classifiers for `profile`, tried in order until one recognizes a line.
///
/// MK3 firmware may speak either the structured MMU3 protocol or the
/// older plain-text one, so both are consulted.
pub fn classifiers_for(profile: PrinterProfile) -> &'static [&'static dyn LineClassifier] {
    if profile.is_legacy() { &MK3_CHAIN } else { &TERSE_CHAIN }
}

/// Runs `line` through the classifiers of `profile`.
pub fn classify_line(profile: PrinterProfile, mmu: &MmuState, line: &str) -> Vec<MmuDelta> {
    for classifier in classifiers_for(profile) {
        match classifier.classify(mmu, line) {
            Classification::Unmatched => continue,
            Classification::Ignored => {
                tracing::debug!("{} ignored line: {}", classifier.name(), line);
                return Vec::new();
            }
            Classification::Update(deltas) => return deltas,
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmu_shared::MmuStatus;

    #[test]
    fn test_chain_selection() {
        let names: Vec<_> = classifiers_for(PrinterProfile::Mk3).iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["structured", "legacy"]);
        for profile in [PrinterProfile::Mk35, PrinterProfile::Mk39, PrinterProfile::Mk4, PrinterProfile::CoreOne] {
            let names: Vec<_> = classifiers_for(profile).iter().map(|c| c.name()).collect();
            assert_eq!(names, vec!["terse"]);
        }
    }

    #[test]
    fn test_mk3_chain_falls_back_to_legacy() {
        let mmu = MmuState::new();
        let deltas = classify_line(PrinterProfile::Mk3, &mmu, "echo:MMU => 'start'");
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].state, Some(MmuStatus::Starting));
    }

    #[test]
    fn test_unknown_line_yields_nothing() {
        let mmu = MmuState::new();
        assert!(classify_line(PrinterProfile::Mk3, &mmu, "ok T:215.0 /215.0").is_empty());
        assert!(classify_line(PrinterProfile::Mk4, &mmu, "ok T:215.0 /215.0").is_empty());
    }
}
