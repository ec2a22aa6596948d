use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct LinkItem {
    pub sn: Option<String>,
    pub soc: Option<Value>,
    pub kwh: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Data {
    pub soc_kwh: Option<Value>,
    pub soc: Option<Value>,
    pub avg_soc_kwh: Option<Value>,
    pub avg_soc: Option<Value>,
    pub battery_power: Option<Value>,
    pub consumption_power: Option<Value>,
    pub solar_power: Option<Value>,
    pub pv_power: Option<Value>,
    pub off_grid_power: Option<Value>,
    pub online_state: Option<Value>,
    #[serde(default, deserialize_with = "super::null_default")]
    pub items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct BatteryLinks {
    #[serde(default, deserialize_with = "super::null_default")]
    pub data: Data,
}
