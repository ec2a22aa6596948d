use izypower_rs::model::{OnlineState, Snapshot, Station};
use izypower_rs::Error;
use prometheus::{Encoder, Gauge, GaugeVec, TextEncoder};

lazy_static! {
    static ref STATION_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("station_power_watts", "instantaneous station power by flow (in W)"),
        &["station_id", "flow"],
    )
    .unwrap();
    static ref STATION_BATTERY_SOC_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("station_battery_soc_percent", "station battery state of charge"),
        &["station_id"],
    )
    .unwrap();
    static ref STATION_ENERGY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "station_energy_kwh",
            "station energy counters per period (in kWh)",
        ),
        &["station_id", "period", "metric"],
    )
    .unwrap();
    static ref DEVICE_ONLINE_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("device_online", "1 when the device reports online"),
        &["station_id", "device_id"],
    )
    .unwrap();
    static ref PV_STRING_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("pv_string_power_watts", "power of one PV string (in W)"),
        &["station_id", "device_id", "pv"],
    )
    .unwrap();
    static ref BATTERY_LINK_SOC_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("battery_link_soc_percent", "state of charge of one battery module"),
        &["battery_id", "link_id"],
    )
    .unwrap();
    static ref SNAPSHOT_AGE_GAUGE: Gauge = register_gauge!(opts!(
        "snapshot_age_seconds",
        "age of the published snapshot"
    ))
    .unwrap();
}

/// Feed `station` readings to the Prometheus gauges.
fn process_station(station: &Station) {
    let id = station.id.as_str();
    let power = &station.power;
    for (flow, watts) in [
        ("pv", power.pv),
        ("grid", power.grid),
        ("consumption", power.consumption),
        ("battery", power.battery),
        ("battery_pv", power.battery_pv),
    ]
    .iter()
    {
        STATION_POWER_GAUGE
            .with_label_values(&[id, *flow])
            .set(*watts);
    }

    if let Some(soc) = station.battery_soc {
        STATION_BATTERY_SOC_GAUGE.with_label_values(&[id]).set(soc);
    }

    if let Some(energy) = &station.energy {
        for (period, figures) in energy.iter() {
            for (metric, kwh) in [
                ("production", figures.production),
                ("grid_import", figures.grid_import),
                ("grid_export", figures.grid_export),
                ("consumption", figures.consumption),
                ("consumption_from_pv", figures.consumption_from_pv),
                ("battery_charge", figures.battery_charge),
                ("battery_discharge", figures.battery_discharge),
            ]
            .iter()
            {
                STATION_ENERGY_GAUGE
                    .with_label_values(&[id, period.name(), *metric])
                    .set(*kwh);
            }
        }
    }

    for device in &station.devices {
        let online = match device.online {
            OnlineState::Online => 1.0,
            _ => 0.0,
        };
        DEVICE_ONLINE_GAUGE
            .with_label_values(&[id, &device.id])
            .set(online);

        for pv in &device.pv_strings {
            PV_STRING_POWER_GAUGE
                .with_label_values(&[id, &device.id, &pv.name])
                .set(pv.power);
        }
    }

    for battery in &station.batteries {
        for link in &battery.links {
            if let Some(soc) = link.soc {
                BATTERY_LINK_SOC_GAUGE
                    .with_label_values(&[&battery.id, &link.id])
                    .set(soc);
            }
        }
    }
}

/// Update the Prometheus registry from the published snapshot.
///
/// Series of stations, devices and readings missing from `snapshot` are
/// dropped, not kept at their last value.
pub fn collect(snapshot: &Snapshot) {
    for gauge in [
        &*STATION_POWER_GAUGE,
        &*STATION_BATTERY_SOC_GAUGE,
        &*STATION_ENERGY_GAUGE,
        &*DEVICE_ONLINE_GAUGE,
        &*PV_STRING_POWER_GAUGE,
        &*BATTERY_LINK_SOC_GAUGE,
    ] {
        gauge.reset();
    }
    for station in &snapshot.stations {
        process_station(station);
    }
    let age = chrono::Utc::now() - snapshot.taken_at;
    SNAPSHOT_AGE_GAUGE.set(age.num_milliseconds() as f64 / 1000.0);
}

/// Read metrics from Prometheus exporter registry.
pub fn read() -> Result<String, Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::InternalError(format!("failed encoding metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| Error::InternalError(format!("metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod test {
    use super::*;
    use izypower_rs::model::{Battery, BatteryLink, PeriodTable, StationPower};
    use std::collections::BTreeMap;

    fn station(id: &str, soc: Option<f64>, link_soc: Option<f64>) -> Station {
        Station {
            id: id.to_string(),
            name: format!("Station {}", id),
            installed_capacity: None,
            address: None,
            power: StationPower::default(),
            battery_soc: soc,
            last_update: None,
            energy: None,
            rates: PeriodTable::default(),
            device_types: BTreeMap::new(),
            devices: Vec::new(),
            batteries: vec![Battery {
                id: format!("BAT-{}", id),
                device_id: format!("DEV-{}", id),
                soc: None,
                energy: None,
                average_soc: None,
                average_energy: None,
                battery_power: None,
                consumption_power: None,
                solar_power: None,
                pv_power: None,
                off_grid_power: None,
                links: vec![BatteryLink {
                    id: format!("LINK-{}", id),
                    battery_id: format!("BAT-{}", id),
                    soc: link_soc,
                    energy: None,
                }],
            }],
        }
    }

    fn snapshot(stations: Vec<Station>) -> Snapshot {
        Snapshot {
            taken_at: chrono::Utc::now(),
            stations,
            warnings: Vec::new(),
            failures: Vec::new(),
        }
    }

    #[test]
    fn each_snapshot_replaces_previous_series() {
        collect(&snapshot(vec![
            station("m1", Some(80.0), Some(81.0)),
            station("m2", Some(50.0), Some(51.0)),
        ]));
        let output = read().unwrap();
        assert!(output.contains(r#"station_battery_soc_percent{station_id="m1"} 80"#));
        assert!(output.contains(r#"station_battery_soc_percent{station_id="m2"} 50"#));
        assert!(output.contains(r#"battery_link_soc_percent{battery_id="BAT-m1",link_id="LINK-m1"} 81"#));

        collect(&snapshot(vec![station("m1", None, None)]));
        let output = read().unwrap();
        assert!(!output.contains(r#"station_id="m2""#));
        assert!(!output.contains("station_battery_soc_percent{"));
        assert!(!output.contains("battery_link_soc_percent{"));
        assert!(output.contains(r#"station_power_watts{flow="pv",station_id="m1"} 0"#));
    }
}
