// ── Sample decoders ──
//
// Pull typed readings out of untyped sample payloads. The vendor mixes
// booleans, 0/1 numbers, numeric strings and nested per-port objects, so
// each decoder accepts a small, fixed set of shapes and returns `None` for
// everything else.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use wifipool_api::Sample;

/// Payload fields consulted, in order, when reading a switch state.
pub const SWITCH_FIELDS: [&str; 5] = ["power", "switch", "relay", "state", "value"];

/// Finite number from a JSON number or numeric string.
pub fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// `true`/`false`, or the numbers exactly 1 and 0.
#[allow(clippy::float_cmp)]
pub fn bool_from_scalar(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Some(true),
            Some(v) if v == 0.0 => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Any member of an object reading `true` wins; otherwise `false` if at
/// least one member read `false`.
pub fn bool_from_object(value: &Value) -> Option<bool> {
    let map = value.as_object()?;
    let mut saw_false = false;
    for v in map.values() {
        match bool_from_scalar(v) {
            Some(true) => return Some(true),
            Some(false) => saw_false = true,
            None => {}
        }
    }
    saw_false.then_some(false)
}

/// How a switch state was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Via {
    Direct,
    Nested,
    Analog,
}

/// First member of the sample's `analog` object, if it is a finite number.
pub fn first_analog(sample: &Sample) -> Option<(String, f64)> {
    let (key, value) = sample.sensor_object("analog")?.iter().next()?;
    number(value).map(|v| (key.clone(), v))
}

/// DS18B20 temperature: either `ds18b20.temperature` or the `temperature`
/// of the first nested probe object. Returns the probe key when nested.
pub fn ds18b20_temperature(sample: &Sample) -> Option<(Option<String>, f64)> {
    let probe = sample.sensor_object("ds18b20")?;
    if let Some(t) = probe.get("temperature").and_then(number) {
        return Some((None, t));
    }
    let (key, nested) = probe.iter().next()?;
    nested
        .get("temperature")
        .and_then(number)
        .map(|t| (Some(key.clone()), t))
}

/// Decode an on/off state from a switch-like sample.
///
/// Order: a direct boolean/0-1 field, then a nested per-port object, then
/// the first analog value compared against `analog_threshold` by magnitude.
/// `device_sensor_data` is consulted before `device_state_data`.
pub fn switch_state(sample: &Sample, analog_threshold: f64) -> Option<(bool, Via)> {
    let payloads = [&sample.sensor_data, &sample.state_data];

    for payload in payloads {
        if let Some(b) = SWITCH_FIELDS
            .iter()
            .find_map(|f| payload.get(*f).and_then(bool_from_scalar))
        {
            return Some((b, Via::Direct));
        }
    }
    for payload in payloads {
        if let Some(b) = SWITCH_FIELDS
            .iter()
            .find_map(|f| payload.get(*f).and_then(bool_from_object))
        {
            return Some((b, Via::Nested));
        }
    }
    first_analog(sample).map(|(_, v)| (v.abs() >= analog_threshold, Via::Analog))
}

/// Newest finite analog reading, scanning from the newest sample backward.
pub fn latest_analog(samples: &[Sample]) -> Option<(f64, Option<DateTime<Utc>>)> {
    samples
        .iter()
        .rev()
        .find_map(|s| first_analog(s).map(|(_, v)| (v, s.timestamp)))
}

/// Newest finite DS18B20 temperature, scanning from the newest sample backward.
pub fn latest_temperature(samples: &[Sample]) -> Option<(f64, Option<DateTime<Utc>>)> {
    samples
        .iter()
        .rev()
        .find_map(|s| ds18b20_temperature(s).map(|(_, t)| (t, s.timestamp)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(sensor: Value) -> Sample {
        serde_json::from_value(json!({
            "device_sensor_time": "2024-06-15T10:30:00Z",
            "device_sensor_data": sensor
        }))
        .unwrap()
    }

    #[test]
    fn numbers_accept_numeric_strings() {
        assert_eq!(number(&json!("7.25")), Some(7.25));
        assert_eq!(number(&json!(3)), Some(3.0));
        assert_eq!(number(&json!("NaN")), None);
        assert_eq!(number(&json!(true)), None);
    }

    #[test]
    fn scalar_bools() {
        assert_eq!(bool_from_scalar(&json!(true)), Some(true));
        assert_eq!(bool_from_scalar(&json!(0)), Some(false));
        assert_eq!(bool_from_scalar(&json!(1.0)), Some(true));
        assert_eq!(bool_from_scalar(&json!(2)), None);
        assert_eq!(bool_from_scalar(&json!("1")), None);
    }

    #[test]
    fn object_bools_prefer_true() {
        assert_eq!(bool_from_object(&json!({ "a": 0, "b": 1 })), Some(true));
        assert_eq!(bool_from_object(&json!({ "a": false, "b": "x" })), Some(false));
        assert_eq!(bool_from_object(&json!({ "a": "x" })), None);
        assert_eq!(bool_from_object(&json!(1)), None);
    }

    #[test]
    fn switch_state_decode_order() {
        let direct = sample(json!({ "power": 1, "switch": { "0": false } }));
        assert_eq!(switch_state(&direct, 0.5), Some((true, Via::Direct)));

        let nested = sample(json!({ "switch": { "0": false, "1": false } }));
        assert_eq!(switch_state(&nested, 0.5), Some((false, Via::Nested)));

        let analog = sample(json!({ "analog": { "3": -0.7 } }));
        assert_eq!(switch_state(&analog, 0.5), Some((true, Via::Analog)));

        let weak = sample(json!({ "analog": { "3": 0.2 } }));
        assert_eq!(switch_state(&weak, 0.5), Some((false, Via::Analog)));

        let nothing = sample(json!({ "ds18b20": { "temperature": 20 } }));
        assert_eq!(switch_state(&nothing, 0.5), None);
    }

    #[test]
    fn switch_state_reads_state_payload() {
        let s: Sample = serde_json::from_value(json!({
            "device_sensor_data": {},
            "device_state_data": { "power": { "o3": true } }
        }))
        .unwrap();
        assert_eq!(switch_state(&s, 0.5), Some((true, Via::Nested)));
    }

    #[test]
    fn temperature_direct_or_nested() {
        let direct = sample(json!({ "ds18b20": { "temperature": 24.5 } }));
        assert_eq!(ds18b20_temperature(&direct), Some((None, 24.5)));

        let nested = sample(json!({ "ds18b20": { "28-0001": { "temperature": "22.5" } } }));
        assert_eq!(
            ds18b20_temperature(&nested),
            Some((Some("28-0001".into()), 22.5))
        );
    }

    #[test]
    fn latest_analog_skips_non_finite_newest() {
        let samples = vec![
            sample(json!({ "analog": { "0": 7.1 } })),
            sample(json!({ "analog": { "0": "garbage" } })),
        ];
        assert_eq!(latest_analog(&samples).unwrap().0, 7.1);
    }
}
