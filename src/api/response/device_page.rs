use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct DataDto {
    pub key: Option<Value>,
    pub value: Option<Value>,
}

/// One entry of `data.records`, decoded per device during discovery.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: Option<Value>,
    pub device_name: Option<String>,
    pub device_type: Option<Value>,
    pub sn: Option<String>,
    pub serial_number: Option<String>,
    pub software_version: Option<String>,
    pub online_state: Option<Value>,
    pub cluster_mode: Option<Value>,
    /// Object in practice, occasionally delivered as an encoded JSON string.
    pub connect_info_json: Option<Value>,
    #[serde(default, deserialize_with = "super::null_default")]
    pub data_dtos: Vec<DataDto>,
}

impl DeviceRecord {
    /// Serial number from either of the two field names the API uses.
    pub fn serial(&self) -> Option<&str> {
        [self.sn.as_deref(), self.serial_number.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|sn| !sn.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Data {
    #[serde(default, deserialize_with = "super::null_default")]
    pub records: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct DevicePage {
    #[serde(default, deserialize_with = "super::null_default")]
    pub data: Data,
}
