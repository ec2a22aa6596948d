use super::values::{number, number_field, percent_field, timestamp};
use super::{device, device_types, StationPayloads, Warnings};
use crate::api::response::station_info::ExtraData;
use crate::api::response::station_report::StationReport;
use crate::api::response::stations_page::StationRecord;
use crate::model::{EnergyFigures, Period, PeriodTable, Rates, Station, StationPower};
use serde_json::Value;
use std::collections::BTreeMap;

pub(super) fn discover(
    id: String,
    record: &StationRecord,
    payloads: &StationPayloads,
    warnings: &mut Warnings,
) -> Station {
    let info = &payloads.info;
    let types = device_types(info);

    let power = StationPower {
        pv: number_field(info.pv_power.as_ref(), "pv power").unwrap_or_default(),
        grid: number_field(info.grid_power.as_ref(), "grid power").unwrap_or_default(),
        consumption: number_field(info.consumption_power.as_ref(), "consumption power")
            .unwrap_or_default(),
        battery: number_field(info.battery_power.as_ref(), "battery power").unwrap_or_default(),
        battery_pv: number_field(info.battery_pv_power.as_ref(), "battery pv power")
            .unwrap_or_default(),
    };

    let last_update = info.last_update.as_deref().and_then(|raw| {
        let parsed = timestamp(raw);
        if parsed.is_none() {
            log::warn!("station {}: unparseable lastUpdate {:?}", id, raw);
        }
        parsed
    });

    let (devices, batteries) = match &payloads.devices {
        Some(page) => device::discover(&id, page, &types, payloads, warnings),
        None => (Vec::new(), Vec::new()),
    };

    Station {
        name: record
            .station_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Station {}", id)),
        installed_capacity: record.installed_capacity.as_ref().and_then(number),
        address: record.address.clone().filter(|a| !a.trim().is_empty()),
        power,
        battery_soc: percent_field(info.battery_soc.as_ref(), "battery soc"),
        last_update,
        energy: energy(&info.extra_data),
        rates: PeriodTable::from_fn(|period| {
            payloads.reports.get(period).as_ref().map(rates).unwrap_or_default()
        }),
        device_types: types,
        devices,
        batteries,
        id,
    }
}

fn counter(map: &BTreeMap<String, Value>, key: &str) -> f64 {
    number_field(map.get(key), key).unwrap_or_default()
}

/// Per-period energy counters, `None` when the station reports none at all.
pub(super) fn energy(extra: &ExtraData) -> Option<PeriodTable<EnergyFigures>> {
    if extra.production.is_empty()
        && extra.grid.is_empty()
        && extra.consumption.is_empty()
        && extra.battery.is_empty()
    {
        return None;
    }

    Some(PeriodTable::from_fn(|period: Period| {
        let p = period.time_type();
        let consumption = counter(&extra.consumption, p);
        let grid_import = counter(&extra.grid, &format!("{}2", p));
        EnergyFigures {
            production: counter(&extra.production, p),
            grid_export: counter(&extra.grid, &format!("{}1", p)),
            grid_import,
            consumption,
            consumption_from_pv: (consumption - grid_import).max(0.0),
            battery_charge: counter(&extra.battery, &format!("{}_in", p)),
            battery_discharge: counter(&extra.battery, &format!("{}_out", p)),
        }
    }))
}

fn rates(report: &StationReport) -> Rates {
    Rates {
        cover: percent_field(report.cover_rate.as_ref(), "cover_rate"),
        storage_in: percent_field(report.storage_in_rate.as_ref(), "storage_in_rate"),
        self_use: percent_field(report.energy_self_rate.as_ref(), "energy_self_rate"),
        grid_import: percent_field(report.meter_energy_p_rate.as_ref(), "meter_energy_p_rate"),
        storage_out: percent_field(report.storage_out_rate.as_ref(), "storage_out_rate"),
        consumption: percent_field(report.consumption_rate.as_ref(), "consumption_rate"),
        grid_export: percent_field(report.meter_energy_n_rate.as_ref(), "meter_energy_n_rate"),
    }
}
