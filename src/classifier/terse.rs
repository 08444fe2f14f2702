//! Classifier for MK3.5/MK3.9/MK4/Core One firmware.
//!
//! These printers log only short progress phrases, so responses and payloads
//! are synthesized, and a single "done" marker is disambiguated through the
//! action recorded in `last_action`.

use mmu_shared::codes::{PROTOCOL_TAG, payload, terse};
use mmu_shared::{MmuDelta, MmuState, MmuStatus, ResponseCode};

use super::{Classification, LineClassifier, Marker, MarkerRule, always, first_match};

pub struct TerseClassifier;

fn paused(mmu: &MmuState, _line: &str) -> Classification {
    match mmu.state {
        // Still closes out any action in progress, so a later "done" cannot complete it
        MmuStatus::Attention | MmuStatus::PausedUser => {
            Classification::update(MmuDelta::default().with_last_action(Some(MmuStatus::PausedUser)))
        }
        _ => Classification::update(
            MmuDelta::status(MmuStatus::PausedUser)
                .with_response(ResponseCode::Error, payload::WAIT_FOR_USER)
                .with_last_action(Some(MmuStatus::PausedUser)),
        ),
    }
}

fn attention(code: &'static str) -> Classification {
    Classification::update(MmuDelta::status(MmuStatus::Attention).with_response(ResponseCode::Error, code))
}

fn loading(code: &'static str) -> Classification {
    Classification::update(
        MmuDelta::status(MmuStatus::Loading)
            .with_response(ResponseCode::Processing, code)
            .with_last_action(Some(MmuStatus::Loading)),
    )
}

fn unloading(action: MmuStatus) -> Classification {
    Classification::update(
        MmuDelta::status(MmuStatus::Unloading)
            .with_response(ResponseCode::Processing, payload::UNLOADING_TO_FINDA)
            .with_last_action(Some(action)),
    )
}

fn last_action_is(mmu: &MmuState, action: MmuStatus) -> bool {
    mmu.last_action == Some(action)
}

/// `MMU2:` followed by optional spaces and the start keyword.
fn is_start_line(line: &str) -> bool {
    line.find(PROTOCOL_TAG)
        .map(|pos| line[pos + PROTOCOL_TAG.len()..].trim_start().starts_with(terse::START))
        .unwrap_or(false)
}

pub(crate) const RULES: &[MarkerRule] = &[
    MarkerRule {
        name: "paused_user",
        marker: Marker::Contains(&[terse::PAUSED_USER]),
        when: always,
        apply: paused,
    },
    MarkerRule {
        name: "error",
        marker: Marker::Contains(&[terse::ERROR]),
        when: always,
        apply: |_, _| attention(payload::WAIT_FOR_USER),
    },
    MarkerRule {
        name: "error_filament",
        marker: Marker::Contains(&[terse::ERROR_FILAMENT]),
        when: always,
        apply: |_, _| attention(payload::HELP_FILAMENT),
    },
    MarkerRule {
        name: "error_internal",
        marker: Marker::Contains(&[terse::ERROR_INTERNAL]),
        when: always,
        apply: |_, _| attention(payload::INTERNAL),
    },
    MarkerRule {
        name: "error_tmc",
        marker: Marker::Contains(&[terse::ERROR_TMC]),
        when: always,
        apply: |_, _| attention(payload::TMC_FAILED),
    },
    MarkerRule {
        name: "loading_finda",
        marker: Marker::Contains(&[terse::LOADING_FINDA]),
        when: always,
        apply: |_, _| loading(payload::FEEDING_TO_FINDA),
    },
    MarkerRule {
        name: "loading_extruder",
        marker: Marker::Contains(&[terse::LOADING_EXTRUDER]),
        when: always,
        apply: |_, _| loading(payload::FEEDING_TO_EXTRUDER),
    },
    MarkerRule {
        name: "loading_fsensor",
        marker: Marker::Contains(&[terse::LOADING_FSENSOR]),
        when: always,
        apply: |_, _| loading(payload::FEEDING_TO_NOZZLE),
    },
    MarkerRule {
        name: "loaded",
        marker: Marker::Contains(&[terse::ACTION_DONE]),
        when: |mmu| last_action_is(mmu, MmuStatus::Loading),
        apply: |_, _| {
            Classification::update(
                MmuDelta::status(MmuStatus::Loaded)
                    .with_previous_tool(None)
                    .with_response(ResponseCode::Finished, payload::DISENGAGING_IDLER)
                    .with_last_action(Some(MmuStatus::Loaded)),
            )
        },
    },
    MarkerRule {
        name: "unloading",
        marker: Marker::Contains(&[terse::UNLOADING]),
        when: always,
        apply: |_, _| unloading(MmuStatus::Unloading),
    },
    MarkerRule {
        name: "unloading_final",
        marker: Marker::Contains(&[terse::UNLOADING_FINAL]),
        when: always,
        apply: |_, _| unloading(MmuStatus::UnloadingFinal),
    },
    MarkerRule {
        name: "unloaded_final",
        marker: Marker::Contains(&[terse::ACTION_DONE]),
        when: |mmu| last_action_is(mmu, MmuStatus::UnloadingFinal),
        apply: |_, _| {
            Classification::update(
                MmuDelta::status(MmuStatus::Ok)
                    .with_response(ResponseCode::Finished, payload::DISENGAGING_IDLER)
                    .with_last_action(Some(MmuStatus::Ok)),
            )
        },
    },
    MarkerRule {
        name: "start",
        marker: Marker::Pattern(is_start_line),
        when: always,
        // No separate ready line follows on this firmware, so settle to OK at once
        apply: |_, _| {
            Classification::Update(vec![
                MmuDelta::status(MmuStatus::Starting)
                    .with_response(ResponseCode::Finished, payload::OK)
                    .with_last_action(Some(MmuStatus::Ok)),
                MmuDelta::status(MmuStatus::Ok).with_response(ResponseCode::Finished, payload::OK),
            ])
        },
    },
];

impl LineClassifier for TerseClassifier {
    fn name(&self) -> &'static str {
        "terse"
    }

    fn classify(&self, mmu: &MmuState, line: &str) -> Classification {
        let tagged = line.contains(PROTOCOL_TAG);
        if tagged && mmu.last_line.as_deref() == Some(line) {
            return Classification::Ignored;
        }

        let classification = first_match(RULES, mmu, line);
        if !tagged {
            return classification;
        }
        // Every tagged line moves the duplicate cursor, recognized or not
        let remember = MmuDelta::default().with_last_line(Some(line.to_string()));
        match classification {
            Classification::Update(mut deltas) => {
                match deltas.first_mut() {
                    Some(first) => first.last_line = remember.last_line,
                    None => deltas.push(remember),
                }
                Classification::Update(deltas)
            }
            Classification::Unmatched | Classification::Ignored => Classification::update(remember),
        }
    }
}
