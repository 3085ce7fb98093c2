//! Executes a job script against a reservation backend.
//!
//! SHOW and LIST output goes to the job's output writer; status lines go to
//! stdout and failures to stderr.

use std::io::{BufRead, Write};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::Result;
use crate::ipc::client::EmsClient;
use crate::ipc::messages::{ListResponse, ResultCode, ShowResponse};
use crate::render::{render_event_list, render_grid};
use crate::script::parser::{Command, HELP_TEXT, ScriptParser};
use crate::store::{EventStore, Seat};

/// Anything that can answer the four reservation requests.
pub trait EventBackend {
    fn create(&mut self, event_id: u32, rows: usize, cols: usize) -> Result<ResultCode>;
    fn reserve(&mut self, event_id: u32, seats: &[Seat]) -> Result<ResultCode>;
    fn show(&mut self, event_id: u32) -> Result<ShowResponse>;
    fn list(&mut self) -> Result<ListResponse>;
}

impl EventBackend for EmsClient {
    fn create(&mut self, event_id: u32, rows: usize, cols: usize) -> Result<ResultCode> {
        EmsClient::create(self, event_id, rows, cols)
    }

    fn reserve(&mut self, event_id: u32, seats: &[Seat]) -> Result<ResultCode> {
        EmsClient::reserve(self, event_id, seats)
    }

    fn show(&mut self, event_id: u32) -> Result<ShowResponse> {
        EmsClient::show(self, event_id)
    }

    fn list(&mut self) -> Result<ListResponse> {
        EmsClient::list(self)
    }
}

/// Runs scripts directly against a local store.
impl EventBackend for &EventStore {
    fn create(&mut self, event_id: u32, rows: usize, cols: usize) -> Result<ResultCode> {
        Ok(ResultCode::from(&EventStore::create(*self, event_id, rows, cols)))
    }

    fn reserve(&mut self, event_id: u32, seats: &[Seat]) -> Result<ResultCode> {
        Ok(ResultCode::from(&EventStore::reserve(*self, event_id, seats)))
    }

    fn show(&mut self, event_id: u32) -> Result<ShowResponse> {
        Ok(ShowResponse::from(&EventStore::show(*self, event_id)))
    }

    fn list(&mut self) -> Result<ListResponse> {
        Ok(ListResponse::from(&EventStore::list(*self)))
    }
}

/// Counts for a finished script.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    /// Requests sent to the backend
    pub requests: usize,
    /// Requests the backend answered with a failure
    pub failures: usize,
    /// Lines that did not parse
    pub invalid: usize,
}

/// Feeds parsed commands to a backend and collects their output.
pub struct JobRunner<'a, B, O> {
    backend: &'a mut B,
    out: O,
}

impl<'a, B: EventBackend, O: Write> JobRunner<'a, B, O> {
    pub fn new(backend: &'a mut B, out: O) -> Self {
        Self { backend, out }
    }

    /// Run until `QUIT` or end of script. Backend transport errors abort.
    pub fn run<R: BufRead>(&mut self, parser: &mut ScriptParser<R>) -> Result<JobSummary> {
        let mut summary = JobSummary::default();
        loop {
            let command = parser.next_command()?;
            debug!("line {}: {:?}", parser.line_no(), command);
            match command {
                Command::Create { event_id, rows, cols } => {
                    summary.requests += 1;
                    if !self.backend.create(event_id, rows, cols)?.is_ok() {
                        self.fail(&mut summary, "Failed to create event");
                    }
                }
                Command::Reserve { event_id, seats } => {
                    summary.requests += 1;
                    if !self.backend.reserve(event_id, &seats)?.is_ok() {
                        self.fail(&mut summary, "Failed to reserve seats");
                    }
                }
                Command::Show { event_id } => {
                    summary.requests += 1;
                    match self.backend.show(event_id)? {
                        ShowResponse::Found { rows, cols, seats } => {
                            self.out.write_all(render_grid(rows, cols, &seats).as_bytes())?;
                        }
                        ShowResponse::Failed => self.fail(&mut summary, "Failed to show event"),
                    }
                }
                Command::List => {
                    summary.requests += 1;
                    match self.backend.list()? {
                        ListResponse::Found { ids } => {
                            self.out.write_all(render_event_list(&ids).as_bytes())?;
                        }
                        ListResponse::Failed => self.fail(&mut summary, "Failed to list events"),
                    }
                }
                Command::Wait { delay_ms, thread_id } => {
                    if thread_id.is_some() {
                        debug!("WAIT thread id ignored by a single-session client");
                    }
                    if delay_ms > 0 {
                        println!("Waiting...");
                        thread::sleep(Duration::from_millis(u64::from(delay_ms)));
                    }
                }
                Command::Invalid => {
                    summary.invalid += 1;
                    eprintln!("Invalid command. See HELP for usage");
                    warn!("Invalid command on line {}", parser.line_no());
                }
                Command::Help => print!("{}", HELP_TEXT),
                Command::Empty => {}
                Command::Quit | Command::End => break,
            }
        }
        self.out.flush()?;
        Ok(summary)
    }

    fn fail(&self, summary: &mut JobSummary, message: &str) {
        summary.failures += 1;
        eprintln!("{}", message);
        warn!("{}", message);
    }
}
