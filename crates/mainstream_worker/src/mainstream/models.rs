use crate::domain::FetchWindow;
use common::domain::Device;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCredential<'a> {
    pub device_id: &'a str,
    pub device_secret_key: &'a str,
}

/// Body of `POST {base}/batch`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest<'a> {
    pub device_list: Vec<DeviceCredential<'a>>,
    /// Every device's monitor item, joined with ", "
    pub monitor_item: String,
    /// Epoch milliseconds
    pub start: i64,
    pub end: i64,
}

impl<'a> BatchRequest<'a> {
    pub fn new(devices: &'a [Device], window: FetchWindow) -> Self {
        Self {
            device_list: devices
                .iter()
                .map(|device| DeviceCredential {
                    device_id: &device.device_id,
                    device_secret_key: &device.device_secret_key,
                })
                .collect(),
            monitor_item: devices
                .iter()
                .map(|device| device.monitor_item.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            start: window.start.timestamp_millis(),
            end: window.end.timestamp_millis(),
        }
    }
}

/// Body of `POST {base}/latest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestRequest<'a> {
    pub device_id: &'a str,
    pub device_secret_key: &'a str,
    pub monitor_item: &'a str,
}

impl<'a> From<&'a Device> for LatestRequest<'a> {
    fn from(device: &'a Device) -> Self {
        Self {
            device_id: &device.device_id,
            device_secret_key: &device.device_secret_key,
            monitor_item: &device.monitor_item,
        }
    }
}
