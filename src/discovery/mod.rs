//! Topology discovery: raw API payloads in, typed entity tree out.
//!
//! Everything here is pure. A malformed entity is skipped and recorded as a
//! [`DiscoveryWarning`] without affecting its siblings.

mod device;
mod station;
pub mod values;

use crate::api::response::battery_links::BatteryLinks;
use crate::api::response::component::Component;
use crate::api::response::device_page::{DevicePage, DeviceRecord};
use crate::api::response::device_wifi::DeviceWifi;
use crate::api::response::station_info::StationInfo;
use crate::api::response::station_report::StationReport;
use crate::api::response::stations_page::{StationRecord, StationsPage};
use crate::model::{DiscoveryWarning, PeriodTable, Station};
use std::collections::{BTreeMap, HashMap};

pub use values::parse_percent;

/// Raw payloads gathered for one station during a cycle.
#[derive(Debug)]
pub struct StationPayloads {
    pub info: StationInfo,
    pub reports: PeriodTable<Option<StationReport>>,
    pub component: Option<Component>,
    pub devices: Option<DevicePage>,
    /// Keyed by device serial number.
    pub wifi: HashMap<String, DeviceWifi>,
    /// Keyed by battery serial number.
    pub battery_links: HashMap<String, BatteryLinks>,
}

impl StationPayloads {
    pub fn new(info: StationInfo) -> Self {
        Self {
            info,
            reports: PeriodTable::default(),
            component: None,
            devices: None,
            wifi: HashMap::new(),
            battery_links: HashMap::new(),
        }
    }
}

/// Follow-up requests needed once a station's device page is known.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FetchPlan {
    /// Serial numbers of devices with a connectivity block.
    pub wifi: Vec<String>,
    /// Serial numbers of battery devices.
    pub batteries: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub stations: Vec<Station>,
    pub warnings: Vec<DiscoveryWarning>,
}

#[derive(Debug, Default)]
pub(crate) struct Warnings(Vec<DiscoveryWarning>);

impl Warnings {
    pub(crate) fn push(&mut self, entity: impl Into<String>, message: impl Into<String>) {
        let warning = DiscoveryWarning {
            entity: entity.into(),
            message: message.into(),
        };
        log::warn!("skipping {}: {}", warning.entity, warning.message);
        self.0.push(warning);
    }
}

/// Identifiers of the stations listed in `page`, in listing order.
pub fn station_ids(page: &StationsPage) -> Vec<String> {
    page.data
        .records
        .iter()
        .filter_map(|record| record.get("stationsId").and_then(values::id))
        .collect()
}

/// Device-type code → display name, from the station detail.
pub fn device_types(info: &StationInfo) -> BTreeMap<String, String> {
    info.device_types
        .iter()
        .filter_map(|entry| {
            let code = entry.get("value").and_then(values::id)?;
            let name = entry.get("name").and_then(|v| v.as_str())?;
            Some((code, name.to_string()))
        })
        .collect()
}

pub(crate) fn is_battery(record: &DeviceRecord, types: &BTreeMap<String, String>) -> bool {
    let code = record.device_type.as_ref().and_then(values::id);
    let named_battery = code
        .as_ref()
        .and_then(|code| types.get(code))
        .map_or(false, |name| name.to_lowercase().contains("battery"));
    named_battery || code.as_deref() == Some("battery")
}

/// Decide which WiFi and battery-link payloads a station needs.
pub fn fetch_plan(info: &StationInfo, page: &DevicePage) -> FetchPlan {
    let types = device_types(info);
    let mut plan = FetchPlan::default();

    for raw in &page.data.records {
        let record: DeviceRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(_) => continue,
        };
        if record.device_id.as_ref().and_then(values::id).is_none() {
            continue;
        }
        if let Some(serial) = record.serial() {
            plan.wifi.push(serial.to_string());
            if is_battery(&record, &types) {
                plan.batteries.push(serial.to_string());
            }
        }
    }

    plan
}

/// Build the entity tree for every listed station with payloads.
///
/// Stations listed without payloads failed to fetch and are left out; the
/// caller records those failures.
pub fn discover(page: &StationsPage, payloads: &HashMap<String, StationPayloads>) -> Discovery {
    let mut warnings = Warnings::default();
    let mut stations = Vec::new();

    for (index, raw) in page.data.records.iter().enumerate() {
        let record: StationRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                warnings.push(format!("station record #{}", index), e.to_string());
                continue;
            }
        };
        let id = match record.stations_id.as_ref().and_then(values::id) {
            Some(id) => id,
            None => {
                warnings.push(format!("station record #{}", index), "no stationsId");
                continue;
            }
        };
        match payloads.get(&id) {
            Some(station_payloads) => stations.push(station::discover(
                id,
                &record,
                station_payloads,
                &mut warnings,
            )),
            None => log::debug!("no payloads for station {}, leaving it out", id),
        }
    }

    Discovery {
        stations,
        warnings: warnings.0,
    }
}
