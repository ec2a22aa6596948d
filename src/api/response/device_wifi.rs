use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub struct DeviceWifi {
    pub rssi: Option<Value>,
    pub wifi: Option<String>,
    pub ip: Option<String>,
}
