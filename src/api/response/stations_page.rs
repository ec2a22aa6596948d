use serde::Deserialize;
use serde_json::Value;

/// One entry of `data.records`; decoded per record so a malformed station
/// only drops itself.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRecord {
    pub stations_id: Option<Value>,
    pub station_name: Option<String>,
    pub installed_capacity: Option<Value>,
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Data {
    #[serde(default, deserialize_with = "super::null_default")]
    pub records: Vec<Value>,
    pub total: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct StationsPage {
    #[serde(default, deserialize_with = "super::null_default")]
    pub data: Data,
}
