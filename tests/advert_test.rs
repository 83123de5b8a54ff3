use lampyris::advert::{MANUFACTURER_TAG, decode_advertisement};
use lampyris::error::LampyrisError;

#[test]
fn decode_known_payload() {
    let reading = decode_advertisement("90056400000320190", 800).unwrap();
    assert_eq!(reading.battery, 100);
    assert!((reading.cumulative_kwh - 1.0).abs() < 1e-9);
    assert!((reading.rate_kw - 0.5).abs() < 1e-9);
}

#[test]
fn decode_is_deterministic() {
    let first = decode_advertisement("90056400000320190", 800).unwrap();
    let second = decode_advertisement("90056400000320190", 800).unwrap();
    assert_eq!(first, second);
}

#[test]
fn calibration_scales_decoded_energy() {
    let at_800 = decode_advertisement("90056400000320190", 800).unwrap();
    let at_1000 = decode_advertisement("90056400000320190", 1000).unwrap();
    assert!((at_800.cumulative_kwh - 1.0).abs() < 1e-9);
    assert!((at_1000.cumulative_kwh - 0.8).abs() < 1e-9);
    assert!((at_1000.rate_kw - 0.4).abs() < 1e-9);
}

#[test]
fn minimum_length_payload_decodes() {
    // 14 prefix chars plus a single rate digit
    let reading = decode_advertisement("900564000003201", 800).unwrap();
    assert!((reading.rate_kw - 1.0 / 800.0).abs() < 1e-12);
}

#[test]
fn battery_field_is_not_clamped() {
    let reading = decode_advertisement("9005ff00000320190", 800).unwrap();
    assert_eq!(reading.battery, 255);
}

#[test]
fn rejects_malformed_payloads() {
    // Too short to hold the fixed prefix and a rate field
    assert!(matches!(
        decode_advertisement("90056400000320", 800),
        Err(LampyrisError::MalformedPayload { .. })
    ));

    // Wrong manufacturer tag
    assert!(matches!(
        decode_advertisement("beef6400000320190", 800),
        Err(LampyrisError::MalformedPayload { .. })
    ));

    // Non-hex characters in the counter field
    assert!(matches!(
        decode_advertisement("900564zz000320190", 800),
        Err(LampyrisError::MalformedPayload { .. })
    ));

    // Rate field wider than a u64
    let oversized = format!("{}640000032011111111111111111", MANUFACTURER_TAG);
    assert!(matches!(
        decode_advertisement(&oversized, 800),
        Err(LampyrisError::MalformedPayload { .. })
    ));
}

#[test]
fn zero_calibration_is_a_validation_error() {
    assert!(matches!(
        decode_advertisement("90056400000320190", 0),
        Err(LampyrisError::Validation { .. })
    ));
}
