#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use izypower_rs::config::Settings;
use izypower_rs::{entities, Coordinator, CycleOutcome, CycleState, Error};
use rocket::fairing::AdHoc;
use rocket::http::{ContentType, Status};
use rocket::{Build, Rocket, State};
use serde::Serialize;

mod metrics;

type Json = (ContentType, String);

fn json<T: Serialize>(value: &T) -> Result<Json, Error> {
    serde_json::to_string(value)
        .map(|body| (ContentType::JSON, body))
        .map_err(|e| Error::InternalError(format!("failed serializing response: {}", e)))
}

#[derive(Serialize)]
struct StatusReport {
    state: CycleState,
    reauth_required: Option<String>,
    last_error: Option<String>,
    snapshot_taken_at: Option<chrono::DateTime<chrono::Utc>>,
    refresh_period_secs: u64,
}

#[get("/snapshot")]
fn snapshot_route(coordinator: &State<Coordinator>) -> Result<Option<Json>, Error> {
    coordinator
        .current_snapshot()
        .map(|snapshot| json(&*snapshot))
        .transpose()
}

#[get("/entities")]
fn entities_route(coordinator: &State<Coordinator>) -> Result<Option<Json>, Error> {
    coordinator
        .current_snapshot()
        .map(|snapshot| json(&entities::catalogue(&snapshot)))
        .transpose()
}

#[get("/metrics")]
fn metrics_route(coordinator: &State<Coordinator>) -> Result<String, Error> {
    match coordinator.current_snapshot() {
        Some(snapshot) => metrics::collect(&snapshot),
        None => log::info!("no snapshot published yet; returning empty metrics"),
    }
    metrics::read()
}

#[get("/status")]
fn status_route(coordinator: &State<Coordinator>) -> Result<Json, Error> {
    json(&StatusReport {
        state: coordinator.state(),
        reauth_required: coordinator.reauth_required(),
        last_error: coordinator.last_error(),
        snapshot_taken_at: coordinator.current_snapshot().map(|s| s.taken_at),
        refresh_period_secs: coordinator.refresh_period().as_secs(),
    })
}

#[post("/refresh")]
async fn refresh_route(coordinator: &State<Coordinator>) -> Result<(Status, String), Error> {
    match coordinator.refresh_now().await {
        CycleOutcome::Published { stations } => {
            Ok((Status::Ok, format!("published {} stations", stations)))
        }
        CycleOutcome::Skipped => Ok((Status::Accepted, String::from("cycle already running"))),
        CycleOutcome::Cancelled => Err(Error::Cancelled),
        CycleOutcome::AuthFailed(e) | CycleOutcome::Failed(e) => Err(e),
    }
}

/// Log the reauthentication signal for the operator.
async fn watch_auth_failures(coordinator: Coordinator) {
    let mut signal = coordinator.on_auth_failure();
    while signal.changed().await.is_ok() {
        if let Some(reason) = signal.borrow_and_update().clone() {
            log::error!(
                "Izypower Cloud rejected the credentials ({}); update IZY_USERNAME/IZY_PASSWORD and restart",
                reason
            );
        }
    }
}

fn build(coordinator: Coordinator) -> Rocket<Build> {
    rocket::build()
        .manage(coordinator)
        .attach(AdHoc::on_liftoff("Poll scheduler", |rocket| {
            Box::pin(async move {
                if let Some(coordinator) = rocket.state::<Coordinator>() {
                    let scheduler = coordinator.clone();
                    tokio::spawn(async move { scheduler.run().await });
                    tokio::spawn(watch_auth_failures(coordinator.clone()));
                }
            })
        }))
        .attach(AdHoc::on_shutdown("Poll scheduler shutdown", |rocket| {
            Box::pin(async move {
                if let Some(coordinator) = rocket.state::<Coordinator>() {
                    coordinator.shutdown();
                }
            })
        }))
        .mount(
            "/",
            routes![
                snapshot_route,
                entities_route,
                metrics_route,
                status_route,
                refresh_route
            ],
        )
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = Settings::load().map_err(|e| {
        log::error!("{}", e);
        e
    })?;
    log::info!("loaded {:?}", settings);
    let coordinator = Coordinator::new(&settings)?;

    let _ = build(coordinator).launch().await?;
    Ok(())
}
