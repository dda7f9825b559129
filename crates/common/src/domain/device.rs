use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Domain entity for a device as the upstream vendor knows it.
///
/// Serialized with camelCase keys; this is also the shape stored in the
/// device directory cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    pub device_secret_key: String,
    pub monitor_item: String,
}

impl Device {
    /// True when all three upstream-relevant fields are non-empty
    pub fn is_complete(&self) -> bool {
        !self.device_id.is_empty()
            && !self.device_secret_key.is_empty()
            && !self.monitor_item.is_empty()
    }
}

/// Registry row as read from the device table; every column is nullable there
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRow {
    pub device_id: Option<String>,
    pub device_key: Option<String>,
    pub monitor_item: Option<String>,
}

impl DeviceRow {
    /// Converts the row into a [`Device`], or `None` if any required column is
    /// missing or empty.
    pub fn into_device(self) -> Option<Device> {
        let device = Device {
            device_id: self.device_id?,
            device_secret_key: self.device_key?,
            monitor_item: self.monitor_item?,
        };
        device.is_complete().then_some(device)
    }
}

/// Read-only access to the device registry owned by device management
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// List every registry row, complete or not
    async fn list_device_rows(&self) -> DomainResult<Vec<DeviceRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: Option<&str>, key: Option<&str>, item: Option<&str>) -> DeviceRow {
        DeviceRow {
            device_id: id.map(str::to_string),
            device_key: key.map(str::to_string),
            monitor_item: item.map(str::to_string),
        }
    }

    #[test]
    fn test_complete_row_converts() {
        let device = row(Some("dev-1"), Some("secret"), Some("PM25"))
            .into_device()
            .unwrap();
        assert_eq!(device.device_id, "dev-1");
        assert_eq!(device.device_secret_key, "secret");
        assert_eq!(device.monitor_item, "PM25");
    }

    #[test]
    fn test_incomplete_rows_are_rejected() {
        assert!(row(None, Some("secret"), Some("PM25")).into_device().is_none());
        assert!(row(Some("dev-1"), None, Some("PM25")).into_device().is_none());
        assert!(row(Some("dev-1"), Some("secret"), None).into_device().is_none());
        assert!(row(Some(""), Some("secret"), Some("PM25")).into_device().is_none());
    }

    #[test]
    fn test_device_serializes_camel_case() {
        let device = Device {
            device_id: "dev-1".to_string(),
            device_secret_key: "secret".to_string(),
            monitor_item: "PM25".to_string(),
        };
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["deviceSecretKey"], "secret");
        assert_eq!(json["monitorItem"], "PM25");
    }
}
