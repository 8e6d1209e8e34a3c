pub mod client;
pub mod observer;
pub mod orchestrator;

pub use client::{FakeSimulatorClient, SimError, SimulatorClient};
pub use observer::{Channel, ObserverBus, Registration};
pub use orchestrator::{spawn, Deliver, OrchestratorActor, Tick};
