use izypower_rs::auth::Credentials;
use izypower_rs::config::Settings;
use izypower_rs::{Coordinator, CycleOutcome, CycleState, Error};
use mockito::{Matcher, Server, ServerGuard};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn read_resource(filename: &str) -> String {
    let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    d.push(format!("resources/test/{}", filename));
    fs::read_to_string(d.as_path()).unwrap()
}

fn settings(server: &ServerGuard) -> Settings {
    let mut settings = Settings::new("user@example.com", "secret");
    settings.api_url = server.url();
    settings.retry_base_ms = 1;
    settings.retry_max_ms = 5;
    settings.retry_jitter_ms = 0;
    settings
}

async fn mock_login(server: &mut ServerGuard, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/api/login")
        .with_status(200)
        .with_body(read_resource("login.json"))
        .expect(hits)
        .create_async()
        .await
}

async fn mock_stations(server: &mut ServerGuard, body: &str) -> mockito::Mock {
    server
        .mock("GET", "/api/powerStations/page")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await
}

/// Every endpoint a healthy station is read from.
async fn mock_station(server: &mut ServerGuard, id: &str) {
    server
        .mock("GET", format!("/api/v3/powerStations/info/{}", id).as_str())
        .with_body(read_resource("stationInfo.json"))
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock(
            "GET",
            format!("/api/report/v2/powerStations/data/{}", id).as_str(),
        )
        .match_query(Matcher::Any)
        .with_body(read_resource("stationReport.json"))
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("GET", format!("/api/component/{}", id).as_str())
        .match_query(Matcher::Any)
        .with_body(read_resource("component.json"))
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/device/page")
        .match_query(Matcher::UrlEncoded("powerId".into(), id.into()))
        .with_body(read_resource("devicePage.json"))
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex(r"^/api/v3/device/wifi/".into()))
        .with_body(read_resource("deviceWifi.json"))
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("GET", "/izy/v2/battery/BAT777")
        .with_body(read_resource("batteryLinks.json"))
        .expect_at_least(1)
        .create_async()
        .await;
}

const ONE_STATION: &str = r#"{"data":{"records":[{"stationsId":1002,"stationName":"Garage"}]}}"#;

#[tokio::test]
async fn failed_station_does_not_block_others() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_stations(&mut server, &read_resource("powerStationsPage.json")).await;
    let failing = server
        .mock("GET", "/api/v3/powerStations/info/1001")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;
    mock_station(&mut server, "1002").await;

    let coordinator = Coordinator::new(&settings(&server)).unwrap();
    let outcome = coordinator.refresh_now().await;

    assert!(matches!(outcome, CycleOutcome::Published { stations: 1 }));
    let snapshot = coordinator.current_snapshot().unwrap();
    assert!(snapshot.station("1001").is_none());

    let garage = snapshot.station("1002").unwrap();
    assert_eq!("Garage", garage.name);
    assert_eq!(3, garage.devices.len());
    assert_eq!(3, garage.batteries[0].links.len());
    assert!(garage.energy.is_some());

    assert_eq!(1, snapshot.failures.len());
    assert_eq!("1001", snapshot.failures[0].station_id);
    assert_eq!(CycleState::Idle, coordinator.state());
    assert_eq!(None, coordinator.reauth_required());
    failing.assert_async().await;
}

#[tokio::test]
async fn token_is_reused_across_cycles() {
    let mut server = Server::new_async().await;
    let login = mock_login(&mut server, 1).await;
    mock_stations(&mut server, ONE_STATION).await;
    mock_station(&mut server, "1002").await;

    let coordinator = Coordinator::new(&settings(&server)).unwrap();
    let first = coordinator.refresh_now().await;
    let second = coordinator.refresh_now().await;

    assert!(matches!(first, CycleOutcome::Published { stations: 1 }));
    assert!(matches!(second, CycleOutcome::Published { stations: 1 }));
    assert_eq!(1, coordinator.api().tokens().login_count());
    login.assert_async().await;
}

#[tokio::test]
async fn persistent_rejection_escalates_and_keeps_snapshot() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, 3).await;
    server
        .mock("GET", "/api/powerStations/page")
        .match_query(Matcher::Any)
        .with_body(ONE_STATION)
        .expect(1)
        .create_async()
        .await;
    let rejected = server
        .mock("GET", "/api/powerStations/page")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    mock_stations(&mut server, ONE_STATION).await;
    mock_station(&mut server, "1002").await;

    let coordinator = Coordinator::new(&settings(&server)).unwrap();
    let mut signal = coordinator.on_auth_failure();

    assert!(matches!(
        coordinator.refresh_now().await,
        CycleOutcome::Published { .. }
    ));
    let before = coordinator.current_snapshot().unwrap();

    let outcome = coordinator.refresh_now().await;

    assert!(matches!(
        outcome,
        CycleOutcome::AuthFailed(Error::Authentication(_))
    ));
    assert_eq!(CycleState::AuthFailed, coordinator.state());
    assert!(Arc::ptr_eq(
        &before,
        &coordinator.current_snapshot().unwrap()
    ));
    assert!(signal.has_changed().unwrap());
    assert!(signal.borrow_and_update().is_some());
    rejected.assert_async().await;

    coordinator
        .reauthenticate(Credentials::new("user@example.com", "new-secret"))
        .await;
    assert_eq!(None, coordinator.reauth_required());
    assert_eq!(CycleState::Idle, coordinator.state());

    assert!(matches!(
        coordinator.refresh_now().await,
        CycleOutcome::Published { stations: 1 }
    ));
    assert!(!Arc::ptr_eq(
        &before,
        &coordinator.current_snapshot().unwrap()
    ));
}

#[tokio::test]
async fn successful_cycle_clears_reauth_signal() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, 2).await;
    server
        .mock("GET", "/api/powerStations/page")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    mock_stations(&mut server, ONE_STATION).await;
    mock_station(&mut server, "1002").await;

    let coordinator = Coordinator::new(&settings(&server)).unwrap();
    let mut signal = coordinator.on_auth_failure();

    assert!(matches!(
        coordinator.refresh_now().await,
        CycleOutcome::AuthFailed(_)
    ));
    assert!(coordinator.reauth_required().is_some());
    let _ = signal.borrow_and_update();

    assert!(matches!(
        coordinator.refresh_now().await,
        CycleOutcome::Published { stations: 1 }
    ));
    assert_eq!(None, coordinator.reauth_required());
    assert_eq!(CycleState::Idle, coordinator.state());
    assert!(signal.has_changed().unwrap());
    assert_eq!(None, *signal.borrow_and_update());
}

#[tokio::test]
async fn unavailable_station_list_keeps_previous_snapshot() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, 1).await;
    server
        .mock("GET", "/api/powerStations/page")
        .match_query(Matcher::Any)
        .with_body(ONE_STATION)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/powerStations/page")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;
    mock_station(&mut server, "1002").await;

    let coordinator = Coordinator::new(&settings(&server)).unwrap();
    coordinator.refresh_now().await;
    let before = coordinator.current_snapshot().unwrap();

    let outcome = coordinator.refresh_now().await;

    assert!(matches!(
        outcome,
        CycleOutcome::Failed(Error::RetriesExhausted { attempts: 3, .. })
    ));
    assert!(Arc::ptr_eq(
        &before,
        &coordinator.current_snapshot().unwrap()
    ));
    assert!(coordinator.last_error().is_some());
    assert_eq!(None, coordinator.reauth_required());
}

#[tokio::test]
async fn optional_payload_failures_degrade() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_stations(&mut server, ONE_STATION).await;
    server
        .mock("GET", "/api/v3/powerStations/info/1002")
        .with_body(read_resource("stationInfo.json"))
        .create_async()
        .await;
    server
        .mock(
            "GET",
            Matcher::Regex(r"^/api/(report|component|device)/".into()),
        )
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let coordinator = Coordinator::new(&settings(&server)).unwrap();
    let outcome = coordinator.refresh_now().await;

    assert!(matches!(outcome, CycleOutcome::Published { stations: 1 }));
    let snapshot = coordinator.current_snapshot().unwrap();
    let garage = snapshot.station("1002").unwrap();
    assert!(garage.devices.is_empty());
    assert_eq!(None, garage.rates.day.cover);
    assert!(snapshot.failures.is_empty());
}

#[tokio::test]
async fn shutdown_abandons_cycle_in_backoff() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, 1).await;
    server
        .mock("GET", "/api/powerStations/page")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let mut settings = settings(&server);
    settings.retry_base_ms = 60_000;
    settings.retry_max_ms = 60_000;
    let coordinator = Coordinator::new(&settings).unwrap();

    let cycle = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.refresh_now().await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    coordinator.shutdown();

    let outcome = tokio::time::timeout(Duration::from_secs(5), cycle)
        .await
        .expect("cycle did not stop")
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Cancelled));
    assert!(coordinator.current_snapshot().is_none());
}

#[tokio::test]
async fn scheduler_publishes_until_shutdown() {
    let mut server = Server::new_async().await;
    mock_login(&mut server, 1).await;
    mock_stations(&mut server, ONE_STATION).await;
    mock_station(&mut server, "1002").await;

    let coordinator = Coordinator::new(&settings(&server)).unwrap();
    let mut snapshots = coordinator.snapshots();
    let scheduler = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run().await })
    };

    tokio::time::timeout(Duration::from_secs(5), snapshots.changed())
        .await
        .expect("no snapshot published")
        .unwrap();
    assert!(coordinator.current_snapshot().is_some());

    coordinator.shutdown();
    tokio::time::timeout(Duration::from_secs(5), scheduler)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}
