//! Server integration tests
//!
//! Runs a real server on FIFOs in a temporary directory and drives it with
//! one or more clients.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ems::ipc::{EmsClient, EmsClientConfig, ListResponse, ResultCode, Server, ServerConfig, ShowResponse};
use ems::render::render_grid;
use ems::script::run_script_file;
use ems::store::{DEFAULT_MAX_EVENT_SEATS, Seat};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    server: Arc<Server>,
    acceptor: JoinHandle<ems::Result<()>>,
}

impl Harness {
    fn start(workers: usize) -> Self {
        // endpoint names must stay short, so avoid a long TMPDIR
        let dir = tempfile::Builder::new().prefix("ems").tempdir_in("/tmp").unwrap();
        let config = ServerConfig::default()
            .with_endpoint(dir.path().join("srv"))
            .with_workers(workers)
            .with_access_delay(Duration::ZERO);
        let server = Arc::new(Server::bind(config).unwrap());

        let acceptor = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.run())
        };
        Self { dir, server, acceptor }
    }

    fn client_config(&self, name: &str) -> EmsClientConfig {
        EmsClientConfig::new(
            self.path(&format!("{}.req", name)),
            self.path(&format!("{}.resp", name)),
            self.server.endpoint_path(),
        )
    }

    fn client(&self, name: &str) -> EmsClient {
        EmsClient::connect(self.client_config(name)).unwrap()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn stop(self) {
        self.server.shutdown().unwrap();
        self.acceptor.join().unwrap().unwrap();
        self.server.join_workers().unwrap();
    }
}

#[test]
fn test_end_to_end_scenario() {
    let harness = Harness::start(2);
    let mut client = harness.client("c0");
    assert!((0..2).contains(&client.session_id()));

    assert_eq!(client.create(1, 2, 2).unwrap(), ResultCode::Ok);

    match client.show(1).unwrap() {
        ShowResponse::Found { rows, cols, seats } => assert_eq!(render_grid(rows, cols, &seats), "0 0\n0 0\n"),
        ShowResponse::Failed => panic!("show failed"),
    }

    assert_eq!(client.reserve(1, &[Seat::new(1, 1)]).unwrap(), ResultCode::Ok);

    match client.show(1).unwrap() {
        ShowResponse::Found { rows, cols, seats } => assert_eq!(render_grid(rows, cols, &seats), "1 0\n0 0\n"),
        ShowResponse::Failed => panic!("show failed"),
    }

    assert_eq!(client.reserve(1, &[Seat::new(1, 1)]).unwrap(), ResultCode::Failed);
    assert_eq!(client.list().unwrap(), ListResponse::Found { ids: vec![1] });

    let request_path = client.request_path().to_path_buf();
    client.quit().unwrap();
    assert!(!request_path.exists());

    harness.stop();
}

#[test]
fn test_domain_failures_over_the_wire() {
    let harness = Harness::start(1);
    let mut client = harness.client("c0");
    assert_eq!(client.session_id(), 0);

    assert_eq!(client.list().unwrap(), ListResponse::Found { ids: vec![] });
    assert_eq!(client.show(7).unwrap(), ShowResponse::Failed);
    assert_eq!(client.create(1, 0, 3).unwrap(), ResultCode::Failed);
    assert_eq!(client.create(1, 1, 3).unwrap(), ResultCode::Ok);
    assert_eq!(client.create(1, 1, 3).unwrap(), ResultCode::Failed);
    assert_eq!(client.create(2, DEFAULT_MAX_EVENT_SEATS + 1, 1).unwrap(), ResultCode::Failed);
    assert_eq!(client.reserve(1, &[Seat::new(2, 1)]).unwrap(), ResultCode::Failed);
    assert_eq!(client.reserve(1, &[]).unwrap(), ResultCode::Failed);

    // an oversized reservation is answered and the session stays usable
    let seats: Vec<Seat> = (1..=300).map(|c| Seat::new(1, c)).collect();
    assert_eq!(client.reserve(1, &seats).unwrap(), ResultCode::Failed);
    assert_eq!(client.reserve(1, &[Seat::new(1, 3)]).unwrap(), ResultCode::Ok);

    client.quit().unwrap();
    harness.stop();
}

#[test]
fn test_overlapping_reservations_from_concurrent_clients() {
    let harness = Harness::start(4);
    let mut setup = harness.client("setup");
    assert_eq!(setup.create(1, 3, 3).unwrap(), ResultCode::Ok);

    let contenders = 4;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|i| {
            let config = harness.client_config(&format!("r{}", i));
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut client = EmsClient::connect(config).unwrap();
                barrier.wait();
                let result = client.reserve(1, &[Seat::new(2, 2), Seat::new(2, 3)]).unwrap();
                client.quit().unwrap();
                result
            })
        })
        .collect();

    // the setup client holds one of the four workers, so release it first
    setup.quit().unwrap();

    let results: Vec<ResultCode> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let snapshot = harness.server.context().store().show(1).unwrap();
    assert_eq!(snapshot.reserved_count(), 2);
    assert_eq!(snapshot.seat(2, 2), Some(1));
    assert_eq!(snapshot.seat(2, 3), Some(1));

    harness.stop();
}

#[test]
fn test_disjoint_reservations_from_concurrent_clients() {
    let harness = Harness::start(4);
    harness.server.context().store().create(1, 2, 2).unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let config = harness.client_config(&format!("d{}", i));
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut client = EmsClient::connect(config).unwrap();
                barrier.wait();
                let seat = Seat::new(i / 2 + 1, i % 2 + 1);
                let result = client.reserve(1, &[seat]).unwrap();
                client.quit().unwrap();
                result
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), ResultCode::Ok);
    }

    let snapshot = harness.server.context().store().show(1).unwrap();
    assert_eq!(snapshot.reserved_count(), 4);
    let mut markers = snapshot.seats.clone();
    markers.sort_unstable();
    assert_eq!(markers, vec![1, 2, 3, 4]);

    harness.stop();
}

#[test]
fn test_more_clients_than_workers_are_served_in_turn() {
    let harness = Harness::start(1);

    let handles: Vec<_> = (0..3u32)
        .map(|i| {
            let config = harness.client_config(&format!("q{}", i));
            thread::spawn(move || {
                let mut client = EmsClient::connect(config).unwrap();
                let session_id = client.session_id();
                let result = client.create(i + 1, 1, 1).unwrap();
                client.quit().unwrap();
                (session_id, result)
            })
        })
        .collect();

    for handle in handles {
        let (session_id, result) = handle.join().unwrap();
        assert_eq!(session_id, 0);
        assert_eq!(result, ResultCode::Ok);
    }

    let mut ids = harness.server.context().store().list().unwrap();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);

    harness.stop();
}

#[test]
fn test_job_script_over_fifos() {
    let harness = Harness::start(2);
    let mut client = harness.client("job");

    let script = harness.path("scenario.jobs");
    fs::write(
        &script,
        "CREATE 1 2 2\nSHOW 1\nRESERVE 1 [(1,1)]\nSHOW 1\nRESERVE 1 [(1,1)]\nLIST\nBOGUS\n",
    )
    .unwrap();

    let (out_path, summary) = run_script_file(&mut client, &script, 256).unwrap();
    client.quit().unwrap();

    assert_eq!(out_path, harness.path("scenario.out"));
    assert_eq!(fs::read_to_string(&out_path).unwrap(), "0 0\n0 0\n1 0\n0 0\nEvent: 1\n");
    assert_eq!(summary.requests, 6);
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.invalid, 1);

    harness.stop();
}

#[test]
fn test_server_fifo_removed_after_shutdown() {
    let Harness { dir, server, acceptor } = Harness::start(1);
    let endpoint = server.endpoint_path().to_path_buf();
    assert!(endpoint.exists());

    server.shutdown().unwrap();
    acceptor.join().unwrap().unwrap();
    server.join_workers().unwrap();
    assert!(endpoint.exists());

    drop(server);
    assert!(!endpoint.exists());
    assert!(dir.path().exists());
}
