pub mod endpoint;
pub mod error;
pub mod response;

use crate::auth::{accept_language, TokenManager};
use crate::config::Settings;
use crate::model::Period;
use crate::retry::{self, RetryPolicy};
pub use error::Error;
use chrono::NaiveDate;
use response::battery_links::BatteryLinks;
use response::component::Component;
use response::device_page::DevicePage;
use response::device_wifi::DeviceWifi;
use response::station_info::StationInfo;
use response::station_report::StationReport;
use response::stations_page::StationsPage;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Map transport-level failure (connect, timeout, body read) to Error
pub(crate) fn map_transport_err(error: reqwest::Error) -> Error {
    match error.status() {
        Some(status) => status_error(status, error.to_string()),
        None => Error::Network(error.to_string()),
    }
}

fn status_error(status: http::StatusCode, body: String) -> Error {
    match status {
        http::StatusCode::TOO_MANY_REQUESTS => Error::RateExceeded(body),
        http::StatusCode::UNAUTHORIZED | http::StatusCode::FORBIDDEN => {
            Error::TokenRejected(status.as_u16())
        }
        s if s.is_server_error() => Error::Server(s.as_u16(), body),
        s => Error::ApiError(format!("HTTP {}: {}", s.as_u16(), body)),
    }
}

/// Turn a non-2xx status into the matching error, carrying the body as detail.
pub(crate) fn check_status(status: http::StatusCode, body: &str) -> Result<(), Error> {
    if status.is_success() {
        Ok(())
    } else {
        Err(status_error(status, body.to_string()))
    }
}

/// Process value of valid HTTP response (2xx) to identify API-level error indicated with a
/// non-zero `code`. Responses without `code` are carried forward as they are.
/// An expired token reported in the body is treated like an HTTP 401/403.
fn map_response_status(value: Value) -> Result<Value, Error> {
    match value.get("code").and_then(Value::as_i64) {
        None | Some(0) | Some(200) => Ok(value),
        Some(code @ (401 | 403)) => Err(Error::TokenRejected(code as u16)),
        Some(429) => Err(Error::RateExceeded(value.to_string())),
        Some(_) => Err(Error::ApiError(value.to_string())),
    }
}

/// Authenticated, retrying access to the Izypower Cloud endpoints.
///
/// Every call goes through [`retry::retry`]; an access token refused by the
/// server is dropped and the call repeated once with a fresh login.
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    language: &'static str,
    tokens: TokenManager,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(settings: &Settings, cancel: CancellationToken) -> Result<Self, Error> {
        let http = reqwest::ClientBuilder::new()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| Error::InternalError(format!("failed building HTTP client: {}", e)))?;
        let api_url = settings.api_url.trim_end_matches('/').to_string();
        let retry = settings.retry_policy();

        Ok(Self {
            tokens: TokenManager::new(
                http.clone(),
                &api_url,
                settings.credentials(),
                &settings.language,
                retry.clone(),
            ),
            language: accept_language(&settings.language),
            http,
            api_url,
            retry,
            cancel,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    async fn send(&self, url: &str, query: &[(&str, String)], token: &str) -> Result<Value, Error> {
        let response = self
            .http
            .get(url)
            .query(query)
            .header(endpoint::TOKEN_HEADER, token)
            .header(reqwest::header::ACCEPT_LANGUAGE, self.language)
            .header(endpoint::APP_PLATFORM_HEADER, endpoint::APP_PLATFORM)
            .send()
            .await
            .map_err(map_transport_err)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_err)?;
        log::debug!("GET {} (status {})", url, status);
        log::trace!("{}", text);
        check_status(status, &text)?;

        serde_json::from_str::<Value>(&text)
            .map_err(|e| Error::InvalidResponse(text, e.to_string()))
            .and_then(map_response_status)
    }

    async fn authorized_get(&self, url: &str, query: &[(&str, String)]) -> Result<Value, Error> {
        let token = self.tokens.valid_token(&self.cancel).await?;
        match self.send(url, query, &token).await {
            Err(Error::TokenRejected(_)) => {
                self.tokens.invalidate(&token).await;
                let token = self.tokens.valid_token(&self.cancel).await?;
                match self.send(url, query, &token).await {
                    Err(Error::TokenRejected(status)) => Err(Error::Authentication(format!(
                        "token rejected again after a fresh login (HTTP {})",
                        status
                    ))),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = format!("{}{}", self.api_url, endpoint);
        let value = retry::retry(&self.retry, &self.cancel, Error::is_transient, || {
            self.authorized_get(&url, query)
        })
        .await?;

        serde_json::from_value::<T>(value.clone())
            .map_err(|e| Error::InvalidResponse(value.to_string(), e.to_string()))
    }

    /// List every station of the account, following pagination.
    pub async fn list_stations(&self) -> Result<StationsPage, Error> {
        let limit = endpoint::PAGE_LIMIT as usize;
        let mut page = self.stations_page(1).await?;
        let mut last_len = page.data.records.len();
        let mut last_first = page.data.records.first().cloned();
        let mut number = 1;

        while last_len == limit
            && page
                .data
                .total
                .map_or(true, |total| (page.data.records.len() as u64) < total)
        {
            if number >= endpoint::MAX_PAGES {
                log::warn!("station listing stopped after {} pages", number);
                break;
            }
            number += 1;
            let next = self.stations_page(number).await?;
            let first = next.data.records.first().cloned();
            if first.is_some() && first == last_first {
                log::warn!("page {} of the station listing repeats the previous one", number);
                break;
            }
            last_len = next.data.records.len();
            last_first = first;
            page.data.records.extend(next.data.records);
        }

        log::debug!("listed {} stations", page.data.records.len());
        Ok(page)
    }

    async fn stations_page(&self, page: u32) -> Result<StationsPage, Error> {
        self.get(
            endpoint::STATIONS,
            &[
                ("page", page.to_string()),
                ("limit", endpoint::PAGE_LIMIT.to_string()),
            ],
        )
        .await
    }

    /// Live power, energy counters and device types of one station.
    pub async fn get_station_detail(&self, station_id: &str) -> Result<StationInfo, Error> {
        self.get(&format!("{}{}", endpoint::STATION_INFO, station_id), &[])
            .await
    }

    pub async fn get_station_energy(
        &self,
        station_id: &str,
        period: Period,
        date: NaiveDate,
    ) -> Result<StationReport, Error> {
        self.get(
            &format!("{}{}", endpoint::REPORT, station_id),
            &[
                ("timeType", period.time_type().to_string()),
                ("dataFlag", String::from("energy")),
                ("searchTime", period.search_time(date)),
            ],
        )
        .await
    }

    /// Per-string PV production of the station's inverters.
    pub async fn get_station_components(
        &self,
        station_id: &str,
        date: NaiveDate,
    ) -> Result<Component, Error> {
        self.get(
            &format!("{}{}", endpoint::COMPONENT, station_id),
            &[("searchTime", date.format("%Y-%m-%d").to_string())],
        )
        .await
    }

    /// Devices of a station with their status.
    pub async fn get_device_status(&self, station_id: &str) -> Result<DevicePage, Error> {
        self.get(
            endpoint::DEVICE_PAGE,
            &[
                ("powerId", station_id.to_string()),
                ("deviceType", String::from("all")),
                ("page", String::from("1")),
                ("limit", endpoint::PAGE_LIMIT.to_string()),
            ],
        )
        .await
    }

    pub async fn get_device_wifi(&self, serial: &str) -> Result<DeviceWifi, Error> {
        self.get(&format!("{}{}", endpoint::DEVICE_WIFI, serial), &[])
            .await
    }

    pub async fn get_battery_links(&self, serial: &str) -> Result<BatteryLinks, Error> {
        self.get(&format!("{}{}", endpoint::BATTERY_LINKS, serial), &[])
            .await
    }
}
