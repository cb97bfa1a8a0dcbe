//! Minimal JSON layer for the uplink envelope.
//!
//! The envelope has a fixed field order the backend relies on, so it is
//! written directly into a bounded buffer instead of going through a
//! serializer. Responses are scanned for a single `"code"` field; there is
//! no general JSON parser here.
//!
//! Nothing in this module touches the network or the clock.

use std::fmt::Write;

use crate::error::UplinkError;
use crate::message::{Payload, MAX_PAYLOAD_LEN};

/// Maximum size of a complete envelope.
pub const MAX_EVENT_JSON_LEN: usize = 511;

/// Application code reported when the response carries no usable `"code"` field.
pub const APP_CODE_UNKNOWN: i32 = i32::MAX;

/// Event type used for light-sensor readings.
pub const LIGHT_ADC_TYPE: &str = "LIGHT_ADC";

/// Envelope buffer.
pub type EventJson = heapless::String<MAX_EVENT_JSON_LEN>;

/// Build the outer event envelope into a buffer of `N` bytes.
///
/// Produces exactly
/// `{"deviceId":"<id>","messageId":<id>,"ts":<ms>,"type":"<type>","payload":<payload>}`.
/// An empty payload is replaced by `{}` so the result is always valid JSON.
/// Strings are inserted verbatim; callers supply JSON-safe values.
///
/// # Errors
///
/// - `InvalidArg` if `device_id` or `event_type` is empty. An empty type is
///   refused even though `"type":""` would be well-formed JSON, so every
///   envelope on the wire names its event.
/// - `BufferTooSmall` if the envelope does not fit in `N` bytes
pub fn build_event<const N: usize>(
    device_id: &str,
    message_id: u32,
    ts_ms: u32,
    event_type: &str,
    payload_json: &str,
) -> Result<heapless::String<N>, UplinkError> {
    if device_id.is_empty() || event_type.is_empty() {
        return Err(UplinkError::InvalidArg);
    }

    let payload = if payload_json.is_empty() {
        "{}"
    } else {
        payload_json
    };

    let mut out = heapless::String::<N>::new();
    write!(
        out,
        "{{\"deviceId\":\"{}\",\"messageId\":{},\"ts\":{},\"type\":\"{}\",\"payload\":{}}}",
        device_id, message_id, ts_ms, event_type, payload
    )
    .map_err(|_| UplinkError::BufferTooSmall)?;

    Ok(out)
}

/// Extract the application status code from a response body.
///
/// Finds the first `"code"` byte pattern, skips whitespace, expects `:`,
/// skips whitespace, then reads an optional `-` and decimal digits.
/// Values beyond `i32::MAX` saturate.
///
/// Returns [`APP_CODE_UNKNOWN`] when the key is absent, the colon is missing,
/// or no digits follow. That is a normal result, not an error.
pub fn parse_app_code(body: &[u8]) -> i32 {
    const KEY: &[u8] = b"\"code\"";

    let Some(start) = body.windows(KEY.len()).position(|w| w == KEY) else {
        return APP_CODE_UNKNOWN;
    };

    let mut pos = start + KEY.len();
    skip_whitespace(body, &mut pos);
    if body.get(pos) != Some(&b':') {
        return APP_CODE_UNKNOWN;
    }
    pos += 1;
    skip_whitespace(body, &mut pos);

    let negative = body.get(pos) == Some(&b'-');
    if negative {
        pos += 1;
    }

    let mut value: i32 = 0;
    let mut has_digit = false;
    while let Some(&b) = body.get(pos) {
        if !b.is_ascii_digit() {
            break;
        }
        has_digit = true;
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i32::from(b - b'0')))
            .unwrap_or(i32::MAX);
        pos += 1;
    }

    match (has_digit, negative) {
        (false, _) => APP_CODE_UNKNOWN,
        (true, true) => -value,
        (true, false) => value,
    }
}

fn skip_whitespace(body: &[u8], pos: &mut usize) {
    while body.get(*pos).is_some_and(|b| b.is_ascii_whitespace()) {
        *pos += 1;
    }
}

/// Build the payload for a light-sensor ADC reading: `{"adc":<value>}`.
pub fn build_light_adc_payload(adc_value: u32) -> Result<Payload, UplinkError> {
    let mut out = heapless::String::<MAX_PAYLOAD_LEN>::new();
    write!(out, "{{\"adc\":{}}}", adc_value).map_err(|_| UplinkError::BufferTooSmall)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_event_exact_output() {
        let json: EventJson =
            build_event("dev1", 42, 1000, "LIGHT_ADC", "{\"adc\":123}").unwrap();
        assert_eq!(
            json.as_str(),
            "{\"deviceId\":\"dev1\",\"messageId\":42,\"ts\":1000,\"type\":\"LIGHT_ADC\",\"payload\":{\"adc\":123}}"
        );
    }

    #[test]
    fn test_build_event_is_valid_json() {
        let json: EventJson =
            build_event("edge-7", u32::MAX, 0, "RFID_EVENT", "{\"uid\":\"04A1\",\"ok\":true}")
                .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["deviceId"], "edge-7");
        assert_eq!(value["messageId"], u64::from(u32::MAX));
        assert_eq!(value["payload"]["uid"], "04A1");
    }

    #[test]
    fn test_build_event_empty_payload_becomes_object() {
        let json: EventJson = build_event("dev1", 1, 2, "PING", "").unwrap();
        assert!(json.ends_with("\"payload\":{}}"));
        assert!(serde_json::from_str::<serde_json::Value>(&json).is_ok());
    }

    #[test]
    fn test_build_event_buffer_too_small() {
        let result: Result<heapless::String<32>, _> =
            build_event("dev1", 42, 1000, "LIGHT_ADC", "{\"adc\":123}");
        assert_eq!(result, Err(UplinkError::BufferTooSmall));
    }

    #[test]
    fn test_build_event_exact_fit() {
        let expected =
            "{\"deviceId\":\"d\",\"messageId\":1,\"ts\":2,\"type\":\"t\",\"payload\":{}}";
        assert_eq!(expected.len(), 61);

        let fits: Result<heapless::String<61>, _> = build_event("d", 1, 2, "t", "");
        assert_eq!(fits.unwrap().as_str(), expected);

        let short: Result<heapless::String<60>, _> = build_event("d", 1, 2, "t", "");
        assert_eq!(short, Err(UplinkError::BufferTooSmall));
    }

    #[test]
    fn test_build_event_rejects_empty_identity() {
        let result: Result<EventJson, _> = build_event("", 1, 2, "t", "{}");
        assert_eq!(result, Err(UplinkError::InvalidArg));

        let result: Result<EventJson, _> = build_event("dev", 1, 2, "", "{}");
        assert_eq!(result, Err(UplinkError::InvalidArg));
    }

    #[test]
    fn test_parse_app_code_values() {
        assert_eq!(parse_app_code(br#"{"code":0}"#), 0);
        assert_eq!(parse_app_code(br#"{"code":-5,"msg":"bad"}"#), -5);
        assert_eq!(parse_app_code(br#"{"code":2147483647}"#), 2147483647);
        assert_eq!(parse_app_code(br#"{"msg":"ok", "code" :  17 }"#), 17);
    }

    #[test]
    fn test_parse_app_code_from_envelope_style_body() {
        let json: EventJson = build_event("dev1", 9, 10, "ACK", "{\"code\":-5}").unwrap();
        assert_eq!(parse_app_code(json.as_bytes()), -5);
    }

    #[test]
    fn test_parse_app_code_first_occurrence_only() {
        assert_eq!(parse_app_code(br#"{"code":3,"inner":{"code":4}}"#), 3);
    }

    #[test]
    fn test_parse_app_code_unknown_cases() {
        assert_eq!(parse_app_code(b""), APP_CODE_UNKNOWN);
        assert_eq!(parse_app_code(br#"{"status":"ok"}"#), APP_CODE_UNKNOWN);
        // Key without colon
        assert_eq!(parse_app_code(br#"{"code" 5}"#), APP_CODE_UNKNOWN);
        // Colon but no digits
        assert_eq!(parse_app_code(br#"{"code":"zero"}"#), APP_CODE_UNKNOWN);
        assert_eq!(parse_app_code(br#"{"code":-}"#), APP_CODE_UNKNOWN);
        // Truncated right after the key
        assert_eq!(parse_app_code(br#"{"code""#), APP_CODE_UNKNOWN);
    }

    #[test]
    fn test_parse_app_code_saturates() {
        assert_eq!(parse_app_code(br#"{"code":2147483648}"#), i32::MAX);
        assert_eq!(parse_app_code(br#"{"code":99999999999999}"#), i32::MAX);
        assert_eq!(parse_app_code(br#"{"code":-99999999999999}"#), -i32::MAX);
    }

    #[test]
    fn test_light_adc_payload() {
        assert_eq!(build_light_adc_payload(1234).unwrap().as_str(), "{\"adc\":1234}");
        assert_eq!(build_light_adc_payload(0).unwrap().as_str(), "{\"adc\":0}");
    }
}
