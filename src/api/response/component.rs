use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvData {
    pub sn: Option<String>,
    pub pv: Option<String>,
    pub pv_power: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(default, deserialize_with = "super::null_default")]
    pub pv_data: Vec<Value>,
}
