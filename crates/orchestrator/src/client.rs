use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::Mutex;

use dispatch_core::ingestor::LiveEvent;
use dispatch_core::roster_import::FahrplanZeile;
use model::time::Minutes;
use model::train::Train;

/// Bubbles out of the orchestrator loop. Every other failure mode in the
/// core's error taxonomy is recovered locally and never reaches here.
#[derive(Debug)]
pub enum SimError {
    Protocol(Box<dyn StdError + Send + Sync>),
    ConnectionLost,
}

impl StdError for SimError {}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Protocol(err) => write!(f, "simulator protocol error: {err}"),
            SimError::ConnectionLost => write!(f, "connection to simulator lost"),
        }
    }
}

/// Normalises the simulator plugin's request/response channel into typed
/// async calls. The core depends only on this trait, never on a concrete
/// transport.
#[async_trait]
pub trait SimulatorClient: Send + Sync {
    async fn anlageninfo(&self) -> Result<String, SimError>;
    async fn bahnsteigliste(&self) -> Result<Vec<String>, SimError>;
    async fn wege(&self) -> Result<Vec<String>, SimError>;
    async fn zugliste(&self) -> Result<Vec<Train>, SimError>;
    async fn zugdetails(&self, train_id: i64) -> Result<Train, SimError>;
    async fn zugfahrplan(&self, train_id: i64) -> Result<Vec<FahrplanZeile>, SimError>;
    /// Awaits the next live event; `ConnectionLost` ends the event task.
    async fn next_event(&self) -> Result<LiveEvent, SimError>;
    async fn simzeit(&self) -> Result<Minutes, SimError>;
}

/// In-memory fake backed by literal fixtures, used by tests and as the
/// grounding for the end-to-end scenario tests.
#[derive(Default)]
pub struct FakeSimulatorClient {
    pub anlage: String,
    pub bahnsteige: Vec<String>,
    pub wege: Vec<String>,
    pub zugliste: Vec<Train>,
    pub fahrplaene: HashMap<i64, Vec<FahrplanZeile>>,
    pub simzeit: Minutes,
    events: Mutex<VecDeque<LiveEvent>>,
}

impl FakeSimulatorClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event to be returned by the next `next_event` call.
    pub fn push_event(&mut self, event: LiveEvent) {
        self.events.get_mut().push_back(event);
    }
}

#[async_trait]
impl SimulatorClient for FakeSimulatorClient {
    async fn anlageninfo(&self) -> Result<String, SimError> {
        Ok(self.anlage.clone())
    }

    async fn bahnsteigliste(&self) -> Result<Vec<String>, SimError> {
        Ok(self.bahnsteige.clone())
    }

    async fn wege(&self) -> Result<Vec<String>, SimError> {
        Ok(self.wege.clone())
    }

    async fn zugliste(&self) -> Result<Vec<Train>, SimError> {
        Ok(self.zugliste.clone())
    }

    async fn zugdetails(&self, train_id: i64) -> Result<Train, SimError> {
        self.zugliste
            .iter()
            .find(|t| t.id.raw() == train_id)
            .cloned()
            .ok_or(SimError::ConnectionLost)
    }

    async fn zugfahrplan(&self, train_id: i64) -> Result<Vec<FahrplanZeile>, SimError> {
        Ok(self.fahrplaene.get(&train_id).cloned().unwrap_or_default())
    }

    async fn next_event(&self) -> Result<LiveEvent, SimError> {
        self.events.lock().await.pop_front().ok_or(SimError::ConnectionLost)
    }

    async fn simzeit(&self) -> Result<Minutes, SimError> {
        Ok(self.simzeit)
    }
}
