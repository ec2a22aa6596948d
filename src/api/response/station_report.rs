use serde::Deserialize;
use serde_json::Value;

/// Rates of one report period. Values are usually strings such as `"42.1%"`.
#[derive(Debug, Default, Deserialize)]
pub struct StationReport {
    pub cover_rate: Option<Value>,
    pub storage_in_rate: Option<Value>,
    pub energy_self_rate: Option<Value>,
    pub meter_energy_p_rate: Option<Value>,
    pub storage_out_rate: Option<Value>,
    pub consumption_rate: Option<Value>,
    pub meter_energy_n_rate: Option<Value>,
}
