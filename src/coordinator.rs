//! Poll cycle orchestration.
//!
//! A [`Coordinator`] fetches every station through the [`ApiClient`], runs
//! the payloads through [`discovery`] and publishes the result as one
//! immutable [`Snapshot`]. Consumers read the latest snapshot and observe
//! the cycle state and the reauthentication signal through `watch` channels.

use crate::api::{ApiClient, Error};
use crate::auth::Credentials;
use crate::config::Settings;
use crate::discovery::{self, StationPayloads};
use crate::model::{Period, Snapshot, StationFailure};
use chrono::{Local, NaiveDate, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleState {
    Idle,
    Fetching,
    Normalizing,
    Published,
    /// Credentials need replacing; scheduled cycles are paused until then.
    AuthFailed,
}

/// How a call to [`Coordinator::refresh_now`] ended.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Published { stations: usize },
    /// Another cycle was already running.
    Skipped,
    AuthFailed(Error),
    /// The cycle failed as a whole; the previous snapshot stays current.
    Failed(Error),
    Cancelled,
}

/// Cheaply cloneable handle to the polling core.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    api: ApiClient,
    snapshot: watch::Sender<Option<Arc<Snapshot>>>,
    state: watch::Sender<CycleState>,
    reauth_required: watch::Sender<Option<String>>,
    last_error: watch::Sender<Option<String>>,
    period: watch::Sender<Duration>,
    cycle: Mutex<()>,
    refresh: Notify,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(settings: &Settings) -> Result<Self, Error> {
        settings.validate()?;
        let cancel = CancellationToken::new();
        let api = ApiClient::new(settings, cancel.clone())?;

        Ok(Self {
            inner: Arc::new(Inner {
                api,
                snapshot: watch::channel(None).0,
                state: watch::channel(CycleState::Idle).0,
                reauth_required: watch::channel(None).0,
                last_error: watch::channel(None).0,
                period: watch::channel(settings.refresh_interval()).0,
                cycle: Mutex::new(()),
                refresh: Notify::new(),
                cancel,
            }),
        })
    }

    /// Latest published snapshot, `None` until a cycle succeeded.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.inner.snapshot.subscribe()
    }

    /// Reauthentication signal: holds the reason while credentials need
    /// replacing, `None` otherwise.
    pub fn on_auth_failure(&self) -> watch::Receiver<Option<String>> {
        self.inner.reauth_required.subscribe()
    }

    pub fn reauth_required(&self) -> Option<String> {
        self.inner.reauth_required.borrow().clone()
    }

    pub fn state(&self) -> CycleState {
        *self.inner.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<CycleState> {
        self.inner.state.subscribe()
    }

    /// Error of the last cycle that failed without an auth problem.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.borrow().clone()
    }

    pub fn refresh_period(&self) -> Duration {
        *self.inner.period.borrow()
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Ask the running scheduler for a cycle as soon as possible.
    pub fn request_refresh(&self) {
        self.inner.refresh.notify_one();
    }

    /// Change the interval between scheduled cycles; applies from the next tick.
    pub fn set_refresh_period(&self, period: Duration) -> Result<(), Error> {
        if period.is_zero() {
            return Err(Error::Configuration(String::from(
                "refresh period must not be zero",
            )));
        }
        log::info!("refresh period set to {:?}", period);
        self.inner.period.send_replace(period);
        Ok(())
    }

    /// Replace the credentials, clear the reauthentication signal and
    /// request an immediate cycle.
    pub async fn reauthenticate(&self, credentials: Credentials) {
        log::info!("reauthenticating as {}", credentials.username);
        self.inner.api.tokens().replace_credentials(credentials).await;
        self.inner.reauth_required.send_replace(None);
        self.inner.state.send_replace(CycleState::Idle);
        self.request_refresh();
    }

    /// Stop the scheduler and abandon any in-flight cycle.
    pub fn shutdown(&self) {
        log::info!("shutting down coordinator");
        self.inner.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Scheduler loop: one cycle per tick or refresh request until
    /// [`shutdown`](Self::shutdown).
    ///
    /// Cycles run on their own tasks; a tick arriving while one is still
    /// running is skipped.
    pub async fn run(&self) {
        let mut period = self.inner.period.subscribe();
        let mut interval = tokio::time::interval(*period.borrow_and_update());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => break,
                changed = period.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let every = *period.borrow_and_update();
                    interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                }
                _ = self.inner.refresh.notified() => self.spawn_cycle(),
                _ = interval.tick() => {
                    if self.reauth_required().is_some() {
                        log::debug!("reauthentication pending, skipping scheduled cycle");
                    } else {
                        self.spawn_cycle();
                    }
                }
            }
        }

        log::debug!("scheduler stopped");
    }

    fn spawn_cycle(&self) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.refresh_now().await;
        });
    }

    /// Run one cycle on the caller's task and wait for it.
    pub async fn refresh_now(&self) -> CycleOutcome {
        let _cycle = match self.inner.cycle.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::debug!("cycle already running, skipping");
                return CycleOutcome::Skipped;
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => Err(Error::Cancelled),
            result = self.cycle() => result,
        };

        match result {
            Ok(snapshot) => {
                let stations = snapshot.stations.len();
                log::info!(
                    "published snapshot with {} stations ({} failed, {} warnings)",
                    stations,
                    snapshot.failures.len(),
                    snapshot.warnings.len()
                );
                self.inner.snapshot.send_replace(Some(Arc::new(snapshot)));
                self.inner.last_error.send_replace(None);
                // A published cycle proves the credentials work again.
                self.inner
                    .reauth_required
                    .send_if_modified(|reason| reason.take().is_some());
                self.inner.state.send_replace(CycleState::Published);
                self.inner.state.send_replace(CycleState::Idle);
                CycleOutcome::Published { stations }
            }
            Err(Error::Cancelled) => {
                log::debug!("cycle cancelled");
                self.inner.state.send_replace(CycleState::Idle);
                CycleOutcome::Cancelled
            }
            Err(e) if e.requires_reauthentication() => {
                log::error!("reauthentication required: {}", e);
                self.inner.reauth_required.send_replace(Some(e.to_string()));
                self.inner.state.send_replace(CycleState::AuthFailed);
                CycleOutcome::AuthFailed(e)
            }
            Err(e) => {
                log::error!("cycle failed, keeping previous snapshot: {}", e);
                self.inner.last_error.send_replace(Some(e.to_string()));
                self.inner.state.send_replace(CycleState::Idle);
                CycleOutcome::Failed(e)
            }
        }
    }

    async fn cycle(&self) -> Result<Snapshot, Error> {
        self.inner.state.send_replace(CycleState::Fetching);
        let api = &self.inner.api;
        let today = Local::now().date_naive();

        let page = api.list_stations().await?;
        let ids = discovery::station_ids(&page);
        log::debug!("fetching {} stations", ids.len());

        let results = join_all(ids.iter().map(|id| fetch_station(api, id, today))).await;

        let mut payloads = HashMap::new();
        let mut failures = Vec::new();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(station) => {
                    payloads.insert(id, station);
                }
                Err(e) if e.requires_reauthentication() || matches!(e, Error::Cancelled) => {
                    return Err(e)
                }
                Err(e) => {
                    log::warn!("station {} failed: {}", id, e);
                    failures.push(StationFailure {
                        station_id: id,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.inner.state.send_replace(CycleState::Normalizing);
        let discovered = discovery::discover(&page, &payloads);

        Ok(Snapshot {
            taken_at: Utc::now(),
            stations: discovered.stations,
            warnings: discovered.warnings,
            failures,
        })
    }
}

/// Optional payloads degrade to absent unless the failure needs escalating.
fn optional<T>(result: Result<T, Error>, what: &str) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.requires_reauthentication() || matches!(e, Error::Cancelled) => Err(e),
        Err(e) => {
            log::warn!("{} unavailable: {}", what, e);
            Ok(None)
        }
    }
}

/// Everything one station needs. Only the station detail is required.
async fn fetch_station(
    api: &ApiClient,
    station_id: &str,
    today: NaiveDate,
) -> Result<StationPayloads, Error> {
    let info = api.get_station_detail(station_id).await?;
    let mut payloads = StationPayloads::new(info);

    let reports = join_all(
        Period::ALL
            .iter()
            .map(|period| api.get_station_energy(station_id, *period, today)),
    )
    .await;
    for (period, report) in Period::ALL.iter().zip(reports) {
        let what = format!("station {} {} report", station_id, period.name());
        *payloads.reports.get_mut(*period) = optional(report, &what)?;
    }

    payloads.component = optional(
        api.get_station_components(station_id, today).await,
        &format!("station {} components", station_id),
    )?;
    payloads.devices = optional(
        api.get_device_status(station_id).await,
        &format!("station {} devices", station_id),
    )?;

    let plan = match &payloads.devices {
        Some(page) => discovery::fetch_plan(&payloads.info, page),
        None => return Ok(payloads),
    };
    for serial in plan.wifi {
        let what = format!("WiFi of {}", serial);
        if let Some(wifi) = optional(api.get_device_wifi(&serial).await, &what)? {
            payloads.wifi.insert(serial, wifi);
        }
    }
    for serial in plan.batteries {
        let what = format!("battery links of {}", serial);
        if let Some(links) = optional(api.get_battery_links(&serial).await, &what)? {
            payloads.battery_links.insert(serial, links);
        }
    }

    Ok(payloads)
}
