//! Classifier for MMU3 request/response logging on MK3 firmware.
//!
//! Response lines look like `MMU2:<T2 P5*3c.`: request letter, request data
//! (hex), a space, response letter, response data (hex, may be empty), `*`,
//! and a checksum we do not need.

use mmu_shared::codes::structured;
use mmu_shared::{MmuDelta, MmuState, MmuStatus, RequestCode, ResponseCode, Slot};
use thiserror::Error;

use super::{Classification, LineClassifier};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("no response prefix")]
    MissingPrefix,
    #[error("line ends before the response is complete")]
    Truncated,
    #[error("unknown request code '{0}'")]
    UnknownRequest(char),
    #[error("unknown response code '{0}'")]
    UnknownResponse(char),
    #[error("request data '{0}' is not hexadecimal")]
    BadRequestData(String),
    #[error("response data '{0}' is not hexadecimal")]
    BadResponseData(String),
    #[error("request names slot {0}, which does not exist")]
    SlotOutOfRange(u8),
}

/// One parsed response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmuResponse {
    pub request: RequestCode,
    pub request_data: u8,
    pub response: ResponseCode,
    pub response_data: String,
}

impl MmuResponse {
    /// The slot the request addresses, for requests that carry one.
    pub fn slot(&self) -> Result<Option<Slot>, ProtocolError> {
        if !self.request.carries_slot() {
            return Ok(None);
        }
        Slot::new(self.request_data)
            .map(Some)
            .ok_or(ProtocolError::SlotOutOfRange(self.request_data))
    }
}

/// The cheap check: a response prefix followed by a known request letter.
pub fn is_response_line(line: &str) -> bool {
    line.find(structured::RESPONSE_PREFIX)
        .and_then(|pos| line[pos + structured::RESPONSE_PREFIX.len()..].chars().next())
        .and_then(RequestCode::from_char)
        .is_some()
}

pub fn parse_response(line: &str) -> Result<MmuResponse, ProtocolError> {
    let start = line
        .find(structured::RESPONSE_PREFIX)
        .ok_or(ProtocolError::MissingPrefix)?
        + structured::RESPONSE_PREFIX.len();
    let body = &line[start..];

    let request_char = body.chars().next().ok_or(ProtocolError::Truncated)?;
    let request = RequestCode::from_char(request_char).ok_or(ProtocolError::UnknownRequest(request_char))?;
    let rest = &body[request_char.len_utf8()..];

    let (request_hex, rest) = rest.split_once(' ').ok_or(ProtocolError::Truncated)?;
    let request_data = u8::from_str_radix(request_hex, 16)
        .map_err(|_| ProtocolError::BadRequestData(request_hex.to_string()))?;

    let (response_part, _checksum) = rest.split_once('*').ok_or(ProtocolError::Truncated)?;
    let response_char = response_part.chars().next().ok_or(ProtocolError::Truncated)?;
    let response = ResponseCode::from_char(response_char).ok_or(ProtocolError::UnknownResponse(response_char))?;
    let response_data = &response_part[response_char.len_utf8()..];
    if !response_data.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProtocolError::BadResponseData(response_data.to_string()));
    }

    Ok(MmuResponse {
        request,
        request_data,
        response,
        response_data: response_data.to_string(),
    })
}

/// Maps a parsed response onto the next state.
fn transition(mmu: &MmuState, response: &MmuResponse) -> Result<MmuDelta, ProtocolError> {
    let slot = response.slot()?;
    let finished = response.response == ResponseCode::Finished;

    // Another error while the attention latch is set only refreshes the payload
    let delta = if mmu.state == MmuStatus::Attention && response.response == ResponseCode::Error {
        MmuDelta::status(MmuStatus::Attention)
    } else {
        match (response.request, finished) {
            (RequestCode::Tool, true) => MmuDelta::status(MmuStatus::Loaded).with_previous_tool(None),
            (RequestCode::Tool, false) => MmuDelta::status(MmuStatus::Loading).with_tool(slot),
            (RequestCode::Load, true) => MmuDelta::status(MmuStatus::Ok),
            (RequestCode::Load, false) => MmuDelta::status(MmuStatus::LoadingToUnit).with_tool(slot),
            (RequestCode::Unload, true) => MmuDelta::status(MmuStatus::Ok),
            (RequestCode::Unload, false) => MmuDelta::status(MmuStatus::Unloading),
            (RequestCode::Reset, _) => MmuDelta::status(MmuStatus::Ok),
            (RequestCode::Cut, true) => MmuDelta::status(MmuStatus::Ok),
            (RequestCode::Cut, false) => MmuDelta::status(MmuStatus::Cutting).with_tool(slot),
            (RequestCode::Eject, true) => MmuDelta::status(MmuStatus::Ok),
            (RequestCode::Eject, false) => MmuDelta::status(MmuStatus::Ejecting).with_tool(slot),
        }
    };
    Ok(delta.with_response(response.response, response.response_data.clone()))
}

pub struct StructuredClassifier;

impl StructuredClassifier {
    fn classify_response(&self, mmu: &MmuState, line: &str) -> Classification {
        // The firmware repeats the same response for as long as an operation runs
        if mmu.last_line.as_deref() == Some(line) {
            return Classification::Ignored;
        }
        let remember = MmuDelta::default().with_last_line(Some(line.to_string()));

        match parse_response(line).and_then(|response| transition(mmu, &response)) {
            Ok(delta) => Classification::update(delta.with_last_line(Some(line.to_string()))),
            Err(e) => {
                tracing::warn!("Dropping malformed MMU response '{}': {}", line, e);
                Classification::update(remember)
            }
        }
    }

    fn classify_side_marker(&self, mmu: &MmuState, line: &str) -> Classification {
        if line.contains(structured::SAVING_PARKING) || line.contains(structured::COOLDOWN_PENDING) {
            if mmu.state == MmuStatus::Attention {
                return Classification::Ignored;
            }
            return Classification::update(MmuDelta::status(MmuStatus::Attention));
        }
        // Forgetting the last line lets the next (identical) response leave the pause
        if mmu.state == MmuStatus::PausedUser && line.contains(structured::LCD_CHANGED) {
            return Classification::update(MmuDelta::default().with_last_line(None));
        }
        Classification::Unmatched
    }
}

impl LineClassifier for StructuredClassifier {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn classify(&self, mmu: &MmuState, line: &str) -> Classification {
        if is_response_line(line) {
            self.classify_response(mmu, line)
        } else {
            self.classify_side_marker(mmu, line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(classification: Classification) -> MmuDelta {
        let mut deltas = classification.deltas();
        assert_eq!(deltas.len(), 1);
        deltas.remove(0)
    }

    #[test]
    fn test_parse_response_groups() {
        let parsed = parse_response("MMU2:<T2 P5*3c.").unwrap();
        assert_eq!(parsed.request, RequestCode::Tool);
        assert_eq!(parsed.request_data, 2);
        assert_eq!(parsed.response, ResponseCode::Processing);
        assert_eq!(parsed.response_data, "5");
    }

    #[test]
    fn test_parse_response_empty_data() {
        let parsed = parse_response("echo:MMU2:<X0 A*").unwrap();
        assert_eq!(parsed.request, RequestCode::Reset);
        assert_eq!(parsed.response, ResponseCode::Accepted);
        assert_eq!(parsed.response_data, "");
    }

    #[test]
    fn test_parse_response_errors() {
        assert_eq!(parse_response("MMU2:<T2"), Err(ProtocolError::Truncated));
        assert_eq!(parse_response("MMU2:<T2 P5"), Err(ProtocolError::Truncated));
        assert_eq!(parse_response("MMU2:<Tz P5*"), Err(ProtocolError::BadRequestData("z".to_string())));
        assert_eq!(parse_response("MMU2:<T2 Z5*"), Err(ProtocolError::UnknownResponse('Z')));
        assert_eq!(parse_response("MMU2:<T2 Pxy*"), Err(ProtocolError::BadResponseData("xy".to_string())));
        assert_eq!(parse_response("MMU2:>T2*"), Err(ProtocolError::MissingPrefix));
    }

    #[test]
    fn test_is_response_line() {
        assert!(is_response_line("MMU2:<T2 P5*"));
        assert!(is_response_line("MMU2:<K1 F0*"));
        assert!(!is_response_line("MMU2:<Q0 A*"));
        assert!(!is_response_line("MMU2:>T2*"));
        assert!(!is_response_line("ok"));
    }

    #[test]
    fn test_mapping_table() {
        let mmu = MmuState { state: MmuStatus::Ok, ..Default::default() };
        let cases = [
            ("MMU2:<T1 P5*", MmuStatus::Loading, Slot::new(1)),
            ("MMU2:<L3 P1*", MmuStatus::LoadingToUnit, Slot::new(3)),
            ("MMU2:<L3 F0*", MmuStatus::Ok, None),
            ("MMU2:<U0 P3*", MmuStatus::Unloading, None),
            ("MMU2:<U0 F0*", MmuStatus::Ok, None),
            ("MMU2:<X0 P0*", MmuStatus::Ok, None),
            ("MMU2:<X0 F0*", MmuStatus::Ok, None),
            ("MMU2:<K4 P13*", MmuStatus::Cutting, Slot::new(4)),
            ("MMU2:<K4 F0*", MmuStatus::Ok, None),
            ("MMU2:<E0 P18*", MmuStatus::Ejecting, Slot::new(0)),
            ("MMU2:<E0 F0*", MmuStatus::Ok, None),
        ];
        for (line, state, tool) in cases {
            let delta = single(StructuredClassifier.classify(&mmu, line));
            assert_eq!(delta.state, Some(state), "{}", line);
            let next = mmu.merged(&delta);
            assert_eq!(next.tool, tool, "{}", line);
        }
    }

    #[test]
    fn test_tool_finished_clears_previous_tool() {
        let mmu = MmuState {
            state: MmuStatus::Ok,
            previous_tool: Slot::new(1),
            ..Default::default()
        };
        let next = mmu.merged(&single(StructuredClassifier.classify(&mmu, "MMU2:<T2 F0*")));
        assert_eq!(next.state, MmuStatus::Loaded);
        assert_eq!(next.previous_tool, None);
        assert_eq!(next.response, Some(ResponseCode::Finished));
        assert_eq!(next.response_data.as_deref(), Some("0"));
    }

    #[test]
    fn test_out_of_range_slot_is_dropped() {
        let mmu = MmuState { state: MmuStatus::Ok, ..Default::default() };
        let delta = single(StructuredClassifier.classify(&mmu, "MMU2:<T9 P5*"));
        assert_eq!(delta.state, None);
        assert_eq!(delta.last_line, Some(Some("MMU2:<T9 P5*".to_string())));
    }

    #[test]
    fn test_attention_latch_keeps_state() {
        let mmu = MmuState { state: MmuStatus::Attention, ..Default::default() };
        let next = mmu.merged(&single(StructuredClassifier.classify(&mmu, "MMU2:<T2 E8001*")));
        assert_eq!(next.state, MmuStatus::Attention);
        assert_eq!(next.response, Some(ResponseCode::Error));
        assert_eq!(next.response_data.as_deref(), Some("8001"));
    }

    #[test]
    fn test_attention_clears_on_non_error() {
        let mmu = MmuState { state: MmuStatus::Attention, ..Default::default() };
        let next = mmu.merged(&single(StructuredClassifier.classify(&mmu, "MMU2:<T2 P6*")));
        assert_eq!(next.state, MmuStatus::Loading);
    }

    #[test]
    fn test_parking_markers() {
        let mmu = MmuState { state: MmuStatus::Loading, ..Default::default() };
        let delta = single(StructuredClassifier.classify(&mmu, "MMU2:Saving and parking"));
        assert_eq!(delta.state, Some(MmuStatus::Attention));
        assert_eq!(delta.response, Some(None));
        let delta = single(StructuredClassifier.classify(&mmu, "MMU2:Heater cooldown pending"));
        assert_eq!(delta.state, Some(MmuStatus::Attention));

        let attention = MmuState { state: MmuStatus::Attention, ..Default::default() };
        assert_eq!(
            StructuredClassifier.classify(&attention, "MMU2:Saving and parking"),
            Classification::Ignored
        );
    }

    #[test]
    fn test_lcd_change_rearms_only_when_paused() {
        let paused = MmuState {
            state: MmuStatus::PausedUser,
            last_line: Some("MMU2:<T2 P5*".to_string()),
            ..Default::default()
        };
        let delta = single(StructuredClassifier.classify(&paused, "LCD status changed"));
        assert_eq!(delta.state, None);
        assert_eq!(delta.last_line, Some(None));

        let ok = MmuState { state: MmuStatus::Ok, ..Default::default() };
        assert_eq!(StructuredClassifier.classify(&ok, "LCD status changed"), Classification::Unmatched);
    }
}
