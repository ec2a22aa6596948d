pub mod battery_links;
pub mod component;
pub mod device_page;
pub mod device_wifi;
pub mod login;
pub mod station_info;
pub mod station_report;
pub mod stations_page;

use serde::{Deserialize, Deserializer};

/* `null` and a missing field both mean "nothing here" for container fields */
pub(crate) fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}
