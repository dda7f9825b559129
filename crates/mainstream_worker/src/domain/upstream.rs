use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::domain::{Device, DomainResult};
use serde::{Deserialize, Deserializer};

/// Half-open `[start, end)` window for a batch fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Window of length `look_back` ending at `end`
    pub fn ending_at(end: DateTime<Utc>, look_back: Duration) -> Self {
        Self {
            start: end - look_back,
            end,
        }
    }
}

/// Success envelope of the batch endpoint.
///
/// `data` is kept as raw JSON so a malformed array can be reported and skipped
/// instead of failing the whole response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchEnvelope {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl BatchEnvelope {
    /// Build from any JSON body, ignoring fields of unexpected type
    pub fn from_json(value: serde_json::Value) -> Self {
        Self {
            code: value.get("code").and_then(serde_json::Value::as_i64),
            message: value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            status: value.get("status").cloned(),
            data: value.get("data").cloned(),
        }
    }

    /// Per-device records, or `None` if `data` is missing or not an array.
    ///
    /// Devices and items are decoded one by one; an element that does not
    /// decode is kept as a [`MalformedBatchItem`] so its siblings survive.
    pub fn device_records(&self) -> Option<Vec<BatchDeviceRecord>> {
        let devices = self.data.as_ref()?.as_array()?;
        Some(devices.iter().map(BatchDeviceRecord::from_json).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeviceRecord {
    /// Empty when the element carried no usable `deviceId`
    pub device_id: String,
    pub data: Vec<BatchItem>,
    pub malformed: Vec<MalformedBatchItem>,
}

impl BatchDeviceRecord {
    fn from_json(value: &serde_json::Value) -> Self {
        let device_id = value
            .get("deviceId")
            .and_then(serde_json::Value::as_str)
            .filter(|id| !id.is_empty());
        let items = match value.get("data") {
            None | Some(serde_json::Value::Null) => Ok(&[][..]),
            Some(serde_json::Value::Array(items)) => Ok(items.as_slice()),
            Some(other) => Err(format!("device data is not an array: {other}")),
        };

        let Some(device_id) = device_id else {
            let reason = "missing deviceId".to_string();
            let malformed = match items {
                Ok(items) if !items.is_empty() => items
                    .iter()
                    .map(|item| MalformedBatchItem::new(item, reason.clone()))
                    .collect(),
                _ => vec![MalformedBatchItem::new(value, reason)],
            };
            return Self {
                malformed,
                ..Self::default()
            };
        };

        let mut record = Self {
            device_id: device_id.to_string(),
            ..Self::default()
        };
        match items {
            Ok(items) => {
                for item in items {
                    match serde_json::from_value::<BatchItem>(item.clone()) {
                        Ok(decoded) => record.data.push(decoded),
                        Err(e) => record
                            .malformed
                            .push(MalformedBatchItem::new(item, e.to_string())),
                    }
                }
            }
            Err(reason) => record.malformed.push(MalformedBatchItem::new(value, reason)),
        }
        record
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub monitor_item: String,
    #[serde(deserialize_with = "string_or_number")]
    pub monitor_time: String,
    #[serde(deserialize_with = "string_or_number")]
    pub monitor_value: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// A batch element that could not be decoded, with whatever scalars it had
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedBatchItem {
    pub monitor_item: String,
    pub monitor_time: String,
    pub error: String,
}

impl MalformedBatchItem {
    fn new(value: &serde_json::Value, error: String) -> Self {
        Self {
            monitor_item: scalar_to_string(value.get("monitorItem")),
            monitor_time: scalar_to_string(value.get("monitorTime")),
            error,
        }
    }
}

/// Result of a latest fetch. Empty `monitor_value`/`monitor_time` mean "no reading".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestReading {
    pub code: i64,
    pub monitor_value: String,
    pub monitor_time: String,
}

impl LatestReading {
    pub fn empty(code: i64) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.monitor_value.is_empty() || self.monitor_time.is_empty()
    }
}

/// Client for the vendor's telemetry API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamTelemetryClient: Send + Sync {
    /// Fetch readings for all devices in the window; non-2xx is an error
    async fn fetch_batch(
        &self,
        devices: &[Device],
        window: FetchWindow,
    ) -> DomainResult<BatchEnvelope>;

    /// Fetch the most recent reading of one device; non-2xx yields an empty reading
    async fn fetch_latest(&self, device: &Device) -> DomainResult<LatestReading>;
}

/// Accepts a JSON string or number and keeps its textual form
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Textual form of an optional JSON scalar; anything else is empty
pub(crate) fn scalar_to_string(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_records_parse_nested_items() {
        let envelope: BatchEnvelope = serde_json::from_value(json!({
            "code": 200,
            "message": "ok",
            "status": "success",
            "data": [{
                "deviceId": "dev-1",
                "deviceStatus": 1,
                "data": [
                    {"monitorItem": "PM25", "monitorTime": "2024-05-01 10:00:00", "monitorValue": "12.5"},
                    {"monitorItem": "PM25", "monitorTime": 1714528800, "monitorValue": 13, "nodeId": "n1"}
                ]
            }]
        }))
        .unwrap();

        let records = envelope.device_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].device_id, "dev-1");
        assert_eq!(records[0].data[1].monitor_time, "1714528800");
        assert_eq!(records[0].data[1].monitor_value, "13");
        assert_eq!(records[0].data[1].node_id.as_deref(), Some("n1"));
    }

    #[test]
    fn test_missing_or_malformed_data_yields_none() {
        let missing: BatchEnvelope =
            serde_json::from_value(json!({"code": 429, "message": "limited"})).unwrap();
        assert!(missing.device_records().is_none());

        let not_array: BatchEnvelope =
            serde_json::from_value(json!({"code": 200, "data": {"deviceId": "x"}})).unwrap();
        assert!(not_array.device_records().is_none());

        let null_data: BatchEnvelope =
            serde_json::from_value(json!({"code": 200, "data": null})).unwrap();
        assert!(null_data.device_records().is_none());
    }

    #[test]
    fn test_undecodable_items_are_kept_apart_from_siblings() {
        let envelope: BatchEnvelope = serde_json::from_value(json!({
            "code": 200,
            "data": [
                { "deviceId": "dev-1", "data": [
                    {"monitorItem": "PM25", "monitorTime": "2024-05-01 10:00:00", "monitorValue": "1"},
                    {"monitorItem": "PM25", "monitorTime": null, "monitorValue": "2"},
                    {"monitorTime": "2024-05-01 10:05:00", "monitorValue": "3"},
                    {"monitorItem": "PM25", "monitorTime": "2024-05-01 10:10:00", "monitorValue": {"v": 4}}
                ]},
                { "data": [
                    {"monitorItem": "NO2", "monitorTime": "2024-05-01 10:00:00", "monitorValue": "5"}
                ]},
                { "deviceId": "dev-3", "data": "oops" },
                { "deviceId": "dev-4" }
            ]
        }))
        .unwrap();

        let records = envelope.device_records().unwrap();
        assert_eq!(records.len(), 4);

        assert_eq!(records[0].device_id, "dev-1");
        assert_eq!(records[0].data.len(), 1);
        assert_eq!(records[0].data[0].monitor_value, "1");
        assert_eq!(records[0].malformed.len(), 3);
        assert_eq!(records[0].malformed[0].monitor_time, "");
        assert_eq!(records[0].malformed[1].monitor_item, "");
        assert_eq!(records[0].malformed[2].monitor_time, "2024-05-01 10:10:00");

        assert_eq!(records[1].device_id, "");
        assert!(records[1].data.is_empty());
        assert_eq!(records[1].malformed.len(), 1);
        assert_eq!(records[1].malformed[0].monitor_item, "NO2");
        assert_eq!(records[1].malformed[0].error, "missing deviceId");

        assert_eq!(records[2].malformed.len(), 1);
        assert!(records[3].data.is_empty() && records[3].malformed.is_empty());
    }

    #[test]
    fn test_window_ends_at_now() {
        let end = Utc::now();
        let window = FetchWindow::ending_at(end, Duration::minutes(30));
        assert_eq!(window.end - window.start, Duration::minutes(30));
    }
}
