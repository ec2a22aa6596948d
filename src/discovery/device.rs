use super::values::{id, integer, number, number_field, percent, percent_field};
use super::{is_battery, StationPayloads, Warnings};
use crate::api::response::battery_links::{BatteryLinks, LinkItem};
use crate::api::response::component::PvData;
use crate::api::response::device_page::{DevicePage, DeviceRecord};
use crate::model::{Battery, BatteryLink, ClusterMode, Connectivity, Device, OnlineState, PvString};
use num::FromPrimitive;
use serde_json::Value;
use std::collections::BTreeMap;

/// Data-point key carrying the average state of charge of integrated batteries.
const AVERAGE_SOC_KEY: &str = "6002";

pub(super) fn discover(
    station_id: &str,
    page: &DevicePage,
    types: &BTreeMap<String, String>,
    payloads: &StationPayloads,
    warnings: &mut Warnings,
) -> (Vec<Device>, Vec<Battery>) {
    let pv_data = pv_data(payloads, warnings);
    let mut devices = Vec::new();
    let mut batteries = Vec::new();

    for (index, raw) in page.data.records.iter().enumerate() {
        let entity = format!("station {} device record #{}", station_id, index);
        let record: DeviceRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                warnings.push(entity, e.to_string());
                continue;
            }
        };
        let device_id = match record.device_id.as_ref().and_then(id) {
            Some(device_id) => device_id,
            None => {
                warnings.push(entity, "no deviceId");
                continue;
            }
        };

        let serial = record.serial().map(str::to_string);

        if let Some(serial) = &serial {
            if is_battery(&record, types) {
                if let Some(links) = payloads.battery_links.get(serial) {
                    batteries.push(battery(serial, &device_id, links, warnings));
                }
            }
        }

        devices.push(Device {
            name: record
                .device_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| format!("Device {}", device_id)),
            model: model(&record, types),
            software_version: record.software_version.clone(),
            online: record
                .online_state
                .as_ref()
                .and_then(integer)
                .and_then(OnlineState::from_i64)
                .unwrap_or(OnlineState::Unknown),
            connectivity: serial.as_ref().map(|serial| connectivity(serial, payloads)),
            pv_strings: serial
                .as_deref()
                .map(|serial| pv_strings(serial, &pv_data))
                .unwrap_or_default(),
            average_soc: average_soc(&record),
            cluster_mode: cluster_mode(&record),
            serial,
            station_id: station_id.to_string(),
            id: device_id,
        });
    }

    (devices, batteries)
}

fn model(record: &DeviceRecord, types: &BTreeMap<String, String>) -> Option<String> {
    let code = record.device_type.as_ref().and_then(id)?;
    Some(types.get(&code).cloned().unwrap_or(code))
}

fn connectivity(serial: &str, payloads: &StationPayloads) -> Connectivity {
    let wifi = payloads.wifi.get(serial);
    Connectivity {
        serial: serial.to_string(),
        rssi: wifi.and_then(|w| number_field(w.rssi.as_ref(), "rssi")),
        ssid: wifi.and_then(|w| w.wifi.clone()).filter(|s| !s.is_empty()),
        ip: wifi.and_then(|w| w.ip.clone()).filter(|s| !s.is_empty()),
    }
}

fn average_soc(record: &DeviceRecord) -> Option<f64> {
    record
        .data_dtos
        .iter()
        .find(|dto| dto.key.as_ref().and_then(id).as_deref() == Some(AVERAGE_SOC_KEY))
        .and_then(|dto| percent_field(dto.value.as_ref(), "average soc"))
}

/// Present only when the device takes part in a cluster.
fn cluster_mode(record: &DeviceRecord) -> Option<ClusterMode> {
    let flag = record.cluster_mode.as_ref().and_then(integer).unwrap_or(0);
    if flag == 0 {
        return None;
    }

    let info = match &record.connect_info_json {
        Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded).ok(),
        other => other.clone(),
    };
    let mode = info
        .as_ref()
        .and_then(|info| info.get("clusterMode"))
        .and_then(|mode| match mode {
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(n) => ClusterMode::from_i64(n),
                Err(_) => match s.trim().to_lowercase().as_str() {
                    "master" => Some(ClusterMode::Master),
                    "slave" => Some(ClusterMode::Slave),
                    "standalone" => Some(ClusterMode::Standalone),
                    _ => None,
                },
            },
            other => integer(other).and_then(ClusterMode::from_i64),
        });

    Some(mode.unwrap_or(ClusterMode::Unknown))
}

fn pv_data(payloads: &StationPayloads, warnings: &mut Warnings) -> Vec<PvData> {
    let component = match &payloads.component {
        Some(component) => component,
        None => return Vec::new(),
    };
    component
        .pv_data
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| match serde_json::from_value(raw.clone()) {
            Ok(pv) => Some(pv),
            Err(e) => {
                warnings.push(format!("pv data #{}", index), e.to_string());
                None
            }
        })
        .collect()
}

fn pv_strings(serial: &str, pv_data: &[PvData]) -> Vec<PvString> {
    pv_data
        .iter()
        .filter(|pv| pv.sn.as_deref().map(str::trim) == Some(serial))
        .enumerate()
        .map(|(index, pv)| PvString {
            name: pv
                .pv
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .map_or_else(|| format!("PV{}", index + 1), str::to_uppercase),
            power: number_field(pv.pv_power.as_ref(), "pv string power").unwrap_or_default(),
        })
        .collect()
}

fn battery(serial: &str, device_id: &str, links: &BatteryLinks, warnings: &mut Warnings) -> Battery {
    let data = &links.data;
    let mut modules = Vec::new();

    for (index, raw) in data.items.iter().enumerate() {
        let entity = format!("battery {} link #{}", serial, index);
        let item: LinkItem = match serde_json::from_value(raw.clone()) {
            Ok(item) => item,
            Err(e) => {
                warnings.push(entity, e.to_string());
                continue;
            }
        };
        match item.sn.as_deref().map(str::trim).filter(|sn| !sn.is_empty()) {
            Some(sn) => modules.push(BatteryLink {
                id: sn.to_string(),
                battery_id: serial.to_string(),
                soc: item.soc.as_ref().and_then(percent),
                energy: item.kwh.as_ref().and_then(number),
            }),
            None => warnings.push(entity, "no serial number"),
        }
    }

    Battery {
        id: serial.to_string(),
        device_id: device_id.to_string(),
        soc: percent_field(data.soc.as_ref(), "battery soc"),
        energy: number_field(data.soc_kwh.as_ref(), "battery energy"),
        average_soc: percent_field(data.avg_soc.as_ref(), "battery average soc"),
        average_energy: number_field(data.avg_soc_kwh.as_ref(), "battery average energy"),
        battery_power: number_field(data.battery_power.as_ref(), "battery power"),
        consumption_power: number_field(data.consumption_power.as_ref(), "consumption power"),
        solar_power: number_field(data.solar_power.as_ref(), "solar power"),
        pv_power: number_field(data.pv_power.as_ref(), "pv power"),
        off_grid_power: number_field(data.off_grid_power.as_ref(), "off-grid power"),
        links: modules,
    }
}
