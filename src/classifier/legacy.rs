//! Classifier for the MMU messages of stock MK3 firmware before MMU3 logging.

use mmu_shared::codes::legacy;
use mmu_shared::{MmuDelta, MmuState, MmuStatus};

use super::{Classification, LineClassifier, Marker, MarkerRule, always, first_match};

pub struct LegacyClassifier;

fn status(state: MmuStatus) -> Classification {
    Classification::update(MmuDelta::status(state))
}

/// Attention outranks a pause, and the firmware repeats the pause line.
fn paused(mmu: &MmuState, _line: &str) -> Classification {
    match mmu.state {
        MmuStatus::Attention | MmuStatus::PausedUser => Classification::Ignored,
        _ => status(MmuStatus::PausedUser),
    }
}

pub(crate) const RULES: &[MarkerRule] = &[
    MarkerRule {
        name: "paused_for_user",
        marker: Marker::Contains(&[legacy::PAUSED_FOR_USER]),
        when: always,
        apply: paused,
    },
    MarkerRule {
        name: "start",
        marker: Marker::Contains(&[legacy::START]),
        when: always,
        apply: |_, _| status(MmuStatus::Starting),
    },
    MarkerRule {
        name: "not_responding",
        marker: Marker::Contains(&[legacy::NOT_RESPONDING]),
        when: always,
        apply: |_, _| status(MmuStatus::Attention),
    },
    MarkerRule {
        name: "responding",
        marker: Marker::Contains(&[legacy::ENABLED, legacy::STARTS_RESPONDING]),
        when: always,
        apply: |_, _| status(MmuStatus::Ok),
    },
    MarkerRule {
        name: "loading",
        marker: Marker::Contains(&[legacy::CAN_LOAD, legacy::UNLOADING_FINISHED]),
        when: always,
        apply: |_, _| status(MmuStatus::Loading),
    },
    MarkerRule {
        name: "loaded",
        marker: Marker::Contains(&[legacy::LOAD_SUCCEEDED]),
        when: always,
        apply: |_, _| status(MmuStatus::Loaded),
    },
];

impl LineClassifier for LegacyClassifier {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn classify(&self, mmu: &MmuState, line: &str) -> Classification {
        first_match(RULES, mmu, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_after(mmu: &MmuState, line: &str) -> Option<MmuStatus> {
        LegacyClassifier.classify(mmu, line).deltas().first().and_then(|d| d.state)
    }

    #[test]
    fn test_rule_priority_order() {
        let names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["paused_for_user", "start", "not_responding", "responding", "loading", "loaded"]);
    }

    #[test]
    fn test_markers() {
        let mmu = MmuState::new();
        assert_eq!(state_after(&mmu, "echo:busy: paused for user"), Some(MmuStatus::PausedUser));
        assert_eq!(state_after(&mmu, "MMU => 'start'"), Some(MmuStatus::Starting));
        assert_eq!(state_after(&mmu, "MMU not responding"), Some(MmuStatus::Attention));
        assert_eq!(state_after(&mmu, "echo:MMU - ENABLED"), Some(MmuStatus::Ok));
        assert_eq!(state_after(&mmu, "MMU starts responding"), Some(MmuStatus::Ok));
        assert_eq!(state_after(&mmu, "MMU can_load:"), Some(MmuStatus::Loading));
        assert_eq!(state_after(&mmu, "Unloading finished 1"), Some(MmuStatus::Loading));
        assert_eq!(state_after(&mmu, "OO succeeded"), Some(MmuStatus::Loaded));
        assert_eq!(LegacyClassifier.classify(&mmu, "ok"), Classification::Unmatched);
    }

    #[test]
    fn test_first_match_wins() {
        let mmu = MmuState::new();
        // Both the pause and the start phrase are present
        assert_eq!(state_after(&mmu, "paused for user MMU => 'start'"), Some(MmuStatus::PausedUser));
    }

    #[test]
    fn test_pause_suppressed_in_attention() {
        let mmu = MmuState { state: MmuStatus::Attention, ..Default::default() };
        assert_eq!(LegacyClassifier.classify(&mmu, "paused for user"), Classification::Ignored);
    }

    #[test]
    fn test_pause_idempotent() {
        let mmu = MmuState { state: MmuStatus::PausedUser, ..Default::default() };
        assert_eq!(LegacyClassifier.classify(&mmu, "paused for user"), Classification::Ignored);
    }
}
