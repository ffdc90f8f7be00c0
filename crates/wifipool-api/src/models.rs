// Vendor wire models.
//
// The vendor publishes no schema, so these types are deliberately lenient:
// payload bodies stay `serde_json::Value` and only the few fields the
// discovery and polling logic relies on are given typed accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Requests ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub namespace: &'static str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupInfoRequest<'a> {
    #[serde(rename = "domainId")]
    pub domain_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatsRequest<'a> {
    pub domain: &'a str,
    pub io: &'a str,
    pub after: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ManualIoRequest<'a> {
    pub domain: &'a str,
    pub io: &'a str,
    pub value: bool,
}

// ── Login ───────────────────────────────────────────────────────────

/// The `user` object of a login response. Both fields are optional;
/// a login without them is still usable.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoginUser {
    #[serde(rename = "mobile_user_id", default)]
    pub id: Option<String>,
    #[serde(rename = "mobile_user_mail", default)]
    pub mail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub user: Option<LoginUser>,
}

// ── Samples ─────────────────────────────────────────────────────────

/// One telemetry reading for one channel, as returned by `getStats`.
///
/// `sensor_data` is the `device_sensor_data` object (holding `analog`,
/// `switch`, `ds18b20`, ... sub-objects); `state_data` is
/// `device_state_data` (holding e.g. `power`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sample {
    #[serde(
        rename = "device_sensor_time",
        default,
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "device_sensor_data", default)]
    pub sensor_data: Value,
    #[serde(rename = "device_state_data", default)]
    pub state_data: Value,
}

impl Sample {
    /// Nested object of `device_sensor_data` by key, if it is an object.
    pub fn sensor_object(&self, key: &str) -> Option<&serde_json::Map<String, Value>> {
        self.sensor_data.get(key).and_then(Value::as_object)
    }

    /// Nested object of `device_state_data` by key, if it is an object.
    pub fn state_object(&self, key: &str) -> Option<&serde_json::Map<String, Value>> {
        self.state_data.get(key).and_then(Value::as_object)
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

/// Parse a vendor timestamp: RFC 3339 strings, or epoch numbers in either
/// seconds or milliseconds (values above 10^10 are taken as milliseconds).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() > 10_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

/// Newest timestamp in a sample batch.
pub fn newest_timestamp(samples: &[Sample]) -> Option<DateTime<Utc>> {
    samples.iter().filter_map(|s| s.timestamp).max()
}

// ── Group info ──────────────────────────────────────────────────────

/// One entry of the `io` inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IoEntry {
    pub id: String,
    pub device: Option<String>,
}

/// Response of `groups/getInfo`.
///
/// The inventory normally lives under `mobile_group_data`, but some
/// accounts return it at the top level; both places are consulted.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct GroupInfo {
    raw: Value,
}

impl GroupInfo {
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    fn section(&self, key: &str) -> &[Value] {
        self.raw
            .get("mobile_group_data")
            .and_then(|d| d.get(key))
            .or_else(|| self.raw.get(key))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The IO inventory. Entries without a string `id` are skipped.
    pub fn io(&self) -> Vec<IoEntry> {
        self.section("io")
            .iter()
            .filter_map(|entry| {
                let id = entry.get("id")?.as_str()?.to_owned();
                let device = entry
                    .get("device")
                    .and_then(Value::as_str)
                    .map(String::from);
                Some(IoEntry { id, device })
            })
            .collect()
    }

    /// Number of raw `io` entries, counting malformed ones.
    pub fn io_len(&self) -> usize {
        self.section("io").len()
    }

    /// Device identifiers in inventory order.
    pub fn device_ids(&self) -> Vec<String> {
        self.section("devices")
            .iter()
            .filter_map(|d| d.get("id").and_then(Value::as_str).map(String::from))
            .collect()
    }

    /// The first device's identifier (`devices[0].id`).
    pub fn first_device_id(&self) -> Option<String> {
        self.section("devices")
            .first()
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .map(String::from)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sample_parses_iso_timestamp_and_payloads() {
        let sample: Sample = serde_json::from_value(json!({
            "device_sensor_time": "2024-06-15T10:30:00.000Z",
            "device_sensor_data": { "analog": { "4": 7.2 } }
        }))
        .unwrap();

        assert_eq!(
            sample.timestamp.unwrap().to_rfc3339(),
            "2024-06-15T10:30:00+00:00"
        );
        assert_eq!(sample.sensor_object("analog").unwrap()["4"], json!(7.2));
        assert!(sample.state_data.is_null());
    }

    #[test]
    fn sample_tolerates_garbage_timestamp() {
        let sample: Sample = serde_json::from_value(json!({
            "device_sensor_time": "yesterday",
            "device_sensor_data": {}
        }))
        .unwrap();
        assert!(sample.timestamp.is_none());
    }

    #[test]
    fn epoch_timestamps_in_both_units() {
        let secs = parse_timestamp(&json!(1_718_447_400)).unwrap();
        let millis = parse_timestamp(&json!(1_718_447_400_000_i64)).unwrap();
        assert_eq!(secs, millis);
    }

    #[test]
    fn group_info_reads_nested_inventory() {
        let info = GroupInfo::from_value(json!({
            "mobile_group_data": {
                "io": [
                    { "id": "dev.o0", "device": "dev" },
                    { "bogus": true }
                ],
                "devices": [{ "id": "dev" }, { "id": "other" }]
            }
        }));

        assert_eq!(info.io_len(), 2);
        assert_eq!(info.io().len(), 1);
        assert_eq!(info.io()[0].device.as_deref(), Some("dev"));
        assert_eq!(info.first_device_id().as_deref(), Some("dev"));
        assert_eq!(info.device_ids(), vec!["dev", "other"]);
    }

    #[test]
    fn group_info_falls_back_to_top_level() {
        let info = GroupInfo::from_value(json!({ "io": [{ "id": "x.i0" }] }));
        assert_eq!(info.io_len(), 1);
        assert!(info.first_device_id().is_none());
    }
}
