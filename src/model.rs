use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use num_derive::FromPrimitive;
use serde::Serialize;
use std::collections::BTreeMap;

pub type Watts = f64;
pub type KWh = f64;
/// Percentage in the 0–100 range, as reported by the API.
pub type Percent = f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Month,
    Year,
    Total,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Day, Period::Month, Period::Year, Period::Total];

    pub fn name(self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Month => "month",
            Period::Year => "year",
            Period::Total => "total",
        }
    }

    /// `timeType` of the report endpoint, also the key prefix of energy counters.
    pub fn time_type(self) -> &'static str {
        match self {
            Period::Total => "all",
            other => other.name(),
        }
    }

    /// `searchTime` the report endpoint expects for this period.
    pub fn search_time(self, date: NaiveDate) -> String {
        match self {
            Period::Day | Period::Total => date.format("%Y-%m-%d").to_string(),
            Period::Month => date.format("%Y-%m").to_string(),
            Period::Year => date.format("%Y").to_string(),
        }
    }
}

/// One value per period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodTable<T> {
    pub day: T,
    pub month: T,
    pub year: T,
    pub total: T,
}

impl<T> PeriodTable<T> {
    pub fn from_fn(mut f: impl FnMut(Period) -> T) -> Self {
        Self {
            day: f(Period::Day),
            month: f(Period::Month),
            year: f(Period::Year),
            total: f(Period::Total),
        }
    }

    pub fn get(&self, period: Period) -> &T {
        match period {
            Period::Day => &self.day,
            Period::Month => &self.month,
            Period::Year => &self.year,
            Period::Total => &self.total,
        }
    }

    pub fn get_mut(&mut self, period: Period) -> &mut T {
        match period {
            Period::Day => &mut self.day,
            Period::Month => &mut self.month,
            Period::Year => &mut self.year,
            Period::Total => &mut self.total,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Period, &T)> {
        Period::ALL.into_iter().map(move |period| (period, self.get(period)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnergyFigures {
    pub production: KWh,
    pub grid_import: KWh,
    pub grid_export: KWh,
    pub consumption: KWh,
    /// Derived, never negative.
    pub consumption_from_pv: KWh,
    pub battery_charge: KWh,
    pub battery_discharge: KWh,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rates {
    pub cover: Option<Percent>,
    pub storage_in: Option<Percent>,
    pub self_use: Option<Percent>,
    pub grid_import: Option<Percent>,
    pub storage_out: Option<Percent>,
    pub consumption: Option<Percent>,
    pub grid_export: Option<Percent>,
}

/// Instantaneous power readings; signed as delivered by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StationPower {
    pub pv: Watts,
    pub grid: Watts,
    pub consumption: Watts,
    pub battery: Watts,
    pub battery_pv: Watts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub installed_capacity: Option<Watts>,
    pub address: Option<String>,
    pub power: StationPower,
    pub battery_soc: Option<Percent>,
    pub last_update: Option<DateTime<FixedOffset>>,
    /// Absent when the station reports no energy counters at all.
    pub energy: Option<PeriodTable<EnergyFigures>>,
    pub rates: PeriodTable<Rates>,
    /// Device type code → display name.
    pub device_types: BTreeMap<String, String>,
    pub devices: Vec<Device>,
    pub batteries: Vec<Battery>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineState {
    Offline = 0,
    Online = 1,
    Unknown = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMode {
    Unknown = 0,
    Master = 1,
    Slave = 2,
    Standalone = 3,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connectivity {
    pub serial: String,
    /// dBm
    pub rssi: Option<f64>,
    pub ssid: Option<String>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PvString {
    pub name: String,
    pub power: Watts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub station_id: String,
    pub name: String,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub software_version: Option<String>,
    pub online: OnlineState,
    /// Only for devices with a serial number.
    pub connectivity: Option<Connectivity>,
    pub pv_strings: Vec<PvString>,
    /// Only for devices with an integrated battery; passed through as reported.
    pub average_soc: Option<Percent>,
    /// Only in multi-inverter installations.
    pub cluster_mode: Option<ClusterMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Battery {
    /// Serial number of the battery pack.
    pub id: String,
    pub device_id: String,
    pub soc: Option<Percent>,
    pub energy: Option<KWh>,
    pub average_soc: Option<Percent>,
    pub average_energy: Option<KWh>,
    pub battery_power: Option<Watts>,
    pub consumption_power: Option<Watts>,
    pub solar_power: Option<Watts>,
    pub pv_power: Option<Watts>,
    pub off_grid_power: Option<Watts>,
    pub links: Vec<BatteryLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryLink {
    /// Serial number of the module.
    pub id: String,
    pub battery_id: String,
    pub soc: Option<Percent>,
    pub energy: Option<KWh>,
}

/// Entity skipped or degraded during discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryWarning {
    pub entity: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationFailure {
    pub station_id: String,
    pub error: String,
}

/// Result of one successful poll cycle. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub stations: Vec<Station>,
    pub warnings: Vec<DiscoveryWarning>,
    pub failures: Vec<StationFailure>,
}

impl Snapshot {
    pub fn station(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|station| station.id == id)
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.stations
            .iter()
            .flat_map(|station| station.devices.iter())
            .find(|device| device.id == id)
    }
}
