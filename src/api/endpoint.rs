pub type Endpoint = str;

pub const LOGIN: &Endpoint = "/api/login";
pub const STATIONS: &Endpoint = "/api/powerStations/page";
pub const STATION_INFO: &Endpoint = "/api/v3/powerStations/info/";
pub const REPORT: &Endpoint = "/api/report/v2/powerStations/data/";
pub const COMPONENT: &Endpoint = "/api/component/";
pub const DEVICE_PAGE: &Endpoint = "/api/device/page";
pub const DEVICE_WIFI: &Endpoint = "/api/v3/device/wifi/";
pub const BATTERY_LINKS: &Endpoint = "/izy/v2/battery/";

pub const TOKEN_HEADER: &str = "x-tts-access-token";
pub const APP_PLATFORM_HEADER: &str = "app-platform";
pub const APP_PLATFORM: &str = "izy";

/// Page size of paginated listings.
pub const PAGE_LIMIT: u32 = 100;
/// Upper bound on pages followed by one listing.
pub const MAX_PAGES: u32 = 50;
