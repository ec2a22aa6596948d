use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Energy counters grouped by category. Keys are the raw period keys of the
/// API (`day`, `month1`, `all_out`, ...).
#[derive(Debug, Default, Deserialize)]
pub struct ExtraData {
    #[serde(default, deserialize_with = "super::null_default")]
    pub production: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "super::null_default")]
    pub grid: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "super::null_default")]
    pub consumption: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "super::null_default")]
    pub battery: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceType {
    pub value: Option<Value>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationInfo {
    #[serde(default, deserialize_with = "super::null_default")]
    pub extra_data: ExtraData,
    #[serde(rename = "power")]
    pub pv_power: Option<Value>,
    #[serde(rename = "grid_power")]
    pub grid_power: Option<Value>,
    #[serde(rename = "consumption")]
    pub consumption_power: Option<Value>,
    #[serde(rename = "battery_power")]
    pub battery_power: Option<Value>,
    #[serde(rename = "battery_pv_power")]
    pub battery_pv_power: Option<Value>,
    #[serde(rename = "battery_soc")]
    pub battery_soc: Option<Value>,
    pub last_update: Option<String>,
    #[serde(default, deserialize_with = "super::null_default")]
    pub device_types: Vec<Value>,
}
