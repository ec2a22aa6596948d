//! Presentation metadata derived from a snapshot: stable identifiers,
//! device-class hints, units and the parent/child links a host needs to
//! register devices and sensors.

use crate::model::{
    Battery, BatteryLink, ClusterMode, Device, OnlineState, Period, Snapshot, Station,
};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

pub const ID_PREFIX: &str = "izypower_cloud";

pub const WATT: &str = "W";
pub const KILO_WATT_HOUR: &str = "kWh";
pub const PERCENT: &str = "%";
pub const DBM: &str = "dBm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Power,
    Energy,
    Battery,
    Timestamp,
    SignalStrength,
    Connectivity,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityValue {
    Number(f64),
    Text(String),
    Timestamp(DateTime<FixedOffset>),
    Flag(bool),
}

/// A grouping node (station, device or battery module) entities attach to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryDevice {
    pub id: String,
    pub name: String,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub software_version: Option<String>,
    /// Registry device this one is reached through.
    pub via: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDescriptor {
    pub unique_id: String,
    /// Owning [`RegistryDevice::id`].
    pub device: String,
    pub name: String,
    pub device_class: Option<DeviceClass>,
    pub unit: Option<&'static str>,
    /// `None` when the snapshot has no reading for it.
    pub value: Option<EntityValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Catalogue {
    pub devices: Vec<RegistryDevice>,
    pub entities: Vec<EntityDescriptor>,
}

pub fn station_key(station_id: &str) -> String {
    format!("{}_station_{}", ID_PREFIX, station_id)
}

pub fn device_key(device_id: &str) -> String {
    format!("{}_device_{}", ID_PREFIX, device_id)
}

pub fn battery_link_key(serial: &str) -> String {
    format!("{}_battery_link_{}", ID_PREFIX, serial)
}

impl Catalogue {
    fn entity(
        &mut self,
        device: &str,
        key: String,
        name: String,
        device_class: Option<DeviceClass>,
        unit: Option<&'static str>,
        value: Option<EntityValue>,
    ) {
        self.entities.push(EntityDescriptor {
            unique_id: format!("{}_{}", device, key),
            device: device.to_string(),
            name,
            device_class,
            unit,
            value,
        });
    }

    fn power(&mut self, device: &str, key: &str, name: String, watts: Option<f64>) {
        let value = watts.map(EntityValue::Number);
        self.entity(device, key.into(), name, Some(DeviceClass::Power), Some(WATT), value);
    }

    fn energy(&mut self, device: &str, key: String, name: String, kwh: Option<f64>) {
        let value = kwh.map(EntityValue::Number);
        self.entity(device, key, name, Some(DeviceClass::Energy), Some(KILO_WATT_HOUR), value);
    }

    fn percent(
        &mut self,
        device: &str,
        key: String,
        name: String,
        class: Option<DeviceClass>,
        value: Option<f64>,
    ) {
        let value = value.map(EntityValue::Number);
        self.entity(device, key, name, class, Some(PERCENT), value);
    }

    /// Ids of all entities, in catalogue order.
    pub fn unique_ids(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.unique_id.as_str())
    }

    pub fn find(&self, unique_id: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|e| e.unique_id == unique_id)
    }
}

pub fn catalogue(snapshot: &Snapshot) -> Catalogue {
    let mut catalogue = Catalogue::default();
    for station in &snapshot.stations {
        add_station(&mut catalogue, station);
    }
    catalogue
}

fn add_station(catalogue: &mut Catalogue, station: &Station) {
    let key = station_key(&station.id);
    let name = &station.name;
    catalogue.devices.push(RegistryDevice {
        id: key.clone(),
        name: name.clone(),
        model: None,
        serial: None,
        software_version: None,
        via: None,
    });

    let power = &station.power;
    catalogue.power(&key, "production_power", format!("{} production power", name), Some(power.pv));
    catalogue.power(&key, "grid_power", format!("{} grid power", name), Some(power.grid));
    catalogue.power(&key, "consumption_power", format!("{} consumption power", name), Some(power.consumption));
    catalogue.power(&key, "battery_power", format!("{} battery power", name), Some(power.battery));
    catalogue.power(&key, "battery_pv_power", format!("{} battery PV power", name), Some(power.battery_pv));
    catalogue.percent(
        &key,
        "battery_soc".into(),
        format!("{} battery", name),
        Some(DeviceClass::Battery),
        station.battery_soc,
    );
    catalogue.entity(
        &key,
        "last_update".into(),
        format!("{} last update", name),
        Some(DeviceClass::Timestamp),
        None,
        station.last_update.map(EntityValue::Timestamp),
    );

    if let Some(energy) = &station.energy {
        for (period, figures) in energy.iter() {
            let metrics = [
                ("production", figures.production),
                ("grid_import", figures.grid_import),
                ("grid_export", figures.grid_export),
                ("consumption", figures.consumption),
                ("consumption_from_pv", figures.consumption_from_pv),
                ("battery_charge", figures.battery_charge),
                ("battery_discharge", figures.battery_discharge),
            ];
            for (metric, kwh) in metrics.iter() {
                catalogue.energy(
                    &key,
                    format!("{}_{}", metric, period.name()),
                    format!("{} {} ({})", name, metric.replace('_', " "), period.name()),
                    Some(*kwh),
                );
            }
        }
    }

    for period in Period::ALL.iter() {
        let rates = station.rates.get(*period);
        let values = [
            ("cover_rate", rates.cover),
            ("storage_in_rate", rates.storage_in),
            ("self_use_rate", rates.self_use),
            ("grid_import_rate", rates.grid_import),
            ("storage_out_rate", rates.storage_out),
            ("consumption_rate", rates.consumption),
            ("grid_export_rate", rates.grid_export),
        ];
        for (rate, value) in values.iter() {
            catalogue.percent(
                &key,
                format!("{}_{}", rate, period.name()),
                format!("{} {} ({})", name, rate.replace('_', " "), period.name()),
                None,
                *value,
            );
        }
    }

    for device in &station.devices {
        add_device(catalogue, &key, device);
    }
    for battery in &station.batteries {
        add_battery(catalogue, battery);
    }
}

fn add_device(catalogue: &mut Catalogue, station_key: &str, device: &Device) {
    let key = device_key(&device.id);
    let name = &device.name;
    catalogue.devices.push(RegistryDevice {
        id: key.clone(),
        name: name.clone(),
        model: device.model.clone(),
        serial: device.serial.clone(),
        software_version: device.software_version.clone(),
        via: Some(station_key.to_string()),
    });

    let online = match device.online {
        OnlineState::Online => Some(EntityValue::Flag(true)),
        OnlineState::Offline => Some(EntityValue::Flag(false)),
        OnlineState::Unknown => None,
    };
    catalogue.entity(
        &key,
        "online_state".into(),
        format!("{} online", name),
        Some(DeviceClass::Connectivity),
        None,
        online,
    );

    for pv in &device.pv_strings {
        catalogue.power(
            &key,
            &format!("pv_{}", pv.name.to_lowercase()),
            format!("{} {}", name, pv.name),
            Some(pv.power),
        );
    }

    if let Some(connectivity) = &device.connectivity {
        catalogue.entity(
            &key,
            "wifi_signal".into(),
            format!("{} WiFi signal", name),
            Some(DeviceClass::SignalStrength),
            Some(DBM),
            connectivity.rssi.map(EntityValue::Number),
        );
        catalogue.entity(
            &key,
            "wifi_ssid".into(),
            format!("{} WiFi network", name),
            None,
            None,
            connectivity.ssid.clone().map(EntityValue::Text),
        );
        catalogue.entity(
            &key,
            "ip_address".into(),
            format!("{} IP address", name),
            None,
            None,
            connectivity.ip.clone().map(EntityValue::Text),
        );
    }

    if let Some(soc) = device.average_soc {
        catalogue.percent(
            &key,
            "device_battery_soc".into(),
            format!("{} battery", name),
            Some(DeviceClass::Battery),
            Some(soc),
        );
    }

    if let Some(mode) = device.cluster_mode {
        let mode = match mode {
            ClusterMode::Master => "master",
            ClusterMode::Slave => "slave",
            ClusterMode::Standalone => "standalone",
            ClusterMode::Unknown => "unknown",
        };
        catalogue.entity(
            &key,
            "cluster_mode".into(),
            format!("{} cluster mode", name),
            Some(DeviceClass::Enum),
            None,
            Some(EntityValue::Text(mode.into())),
        );
    }
}

fn add_battery(catalogue: &mut Catalogue, battery: &Battery) {
    let key = device_key(&battery.device_id);
    let name = format!("Battery {}", battery.id);

    catalogue.energy(&key, "battery_energy".into(), format!("{} energy", name), battery.energy);
    catalogue.percent(
        &key,
        "battery_soc_links".into(),
        format!("{} charge", name),
        Some(DeviceClass::Battery),
        battery.soc,
    );
    catalogue.percent(
        &key,
        "battery_average_soc".into(),
        format!("{} average charge", name),
        Some(DeviceClass::Battery),
        battery.average_soc,
    );
    catalogue.energy(
        &key,
        "battery_average_energy".into(),
        format!("{} average energy", name),
        battery.average_energy,
    );
    let readings = [
        ("battery_link_power", "power", battery.battery_power),
        ("battery_consumption_power", "consumption power", battery.consumption_power),
        ("battery_solar_power", "solar power", battery.solar_power),
        ("battery_pv_power", "PV power", battery.pv_power),
        ("battery_off_grid_power", "off-grid power", battery.off_grid_power),
    ];
    for (suffix, label, watts) in readings.iter() {
        if watts.is_some() {
            catalogue.power(&key, suffix, format!("{} {}", name, label), *watts);
        }
    }

    for link in &battery.links {
        add_link(catalogue, &key, link);
    }
}

fn add_link(catalogue: &mut Catalogue, device_key: &str, link: &BatteryLink) {
    let key = battery_link_key(&link.id);
    let name = format!("Battery module {}", link.id);
    catalogue.devices.push(RegistryDevice {
        id: key.clone(),
        name: name.clone(),
        model: None,
        serial: Some(link.id.clone()),
        software_version: None,
        via: Some(device_key.to_string()),
    });

    catalogue.percent(
        &key,
        "soc".into(),
        format!("{} charge", name),
        Some(DeviceClass::Battery),
        link.soc,
    );
    catalogue.energy(&key, "kwh".into(), format!("{} energy", name), link.energy);
}
