use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use actors::actor::{Actor, SupervisionStrategy};
use actors::actor_ref::ActorRef;
use actors::handler::{Handler, Message};

use dispatch_core::ingestor::LiveEvent;
use dispatch_core::roster_import;
use dispatch_core::DispatchEngine;
use model::config::DispatchParams;

use crate::client::{SimError, SimulatorClient};
use crate::observer::ObserverBus;

/// Periodic full refresh: pull the roster and every train's fahrplan,
/// rebuild the target and event graphs, re-prognose, notify.
#[derive(Clone)]
pub struct Tick;

impl Message for Tick {
    type Response = ();
}

/// One live event arriving between refresh ticks.
#[derive(Clone)]
pub struct Deliver(pub LiveEvent);

impl Message for Deliver {
    type Response = ();
}

/// Owns the `DispatchEngine`; the sole task allowed to mutate it, reached
/// only through its `ActorRef` mailbox.
pub struct OrchestratorActor<C: SimulatorClient + 'static> {
    engine: DispatchEngine,
    client: Arc<C>,
    observers: Arc<ObserverBus>,
}

impl<C: SimulatorClient + 'static> Actor for OrchestratorActor<C> {
    fn on_fail(&mut self, error: Box<dyn Any + Send>) -> SupervisionStrategy {
        log::error!("orchestrator actor panicked: {error:?}");
        SupervisionStrategy::Resume
    }
}

impl<C: SimulatorClient + 'static> OrchestratorActor<C> {
    async fn refresh(&mut self) -> Result<(), SimError> {
        let trains = self.client.zugliste().await?;
        let mut schedules = HashMap::with_capacity(trains.len());
        for train in &trains {
            let train_id = train.id.raw();
            let rows = self.client.zugfahrplan(train_id).await?;
            schedules.insert(train_id, rows);
        }

        self.engine.refresh_trains(trains);
        let target_graph = roster_import::build_target_graph(&schedules, &self.engine.params);
        self.engine.replace_target_graph(target_graph);

        self.observers.anlage_changed.notify(&());
        self.observers.plan_changed.notify(&());
        Ok(())
    }
}

#[async_trait]
impl<C: SimulatorClient + 'static> Handler<Tick> for OrchestratorActor<C> {
    async fn handle(&mut self, _msg: Tick) {
        if let Err(err) = self.refresh().await {
            log::error!("periodic refresh failed: {err}");
        }
    }
}

#[async_trait]
impl<C: SimulatorClient + 'static> Handler<Deliver> for OrchestratorActor<C> {
    async fn handle(&mut self, msg: Deliver) {
        if self.engine.ingest_event(&msg.0) {
            self.observers.event_received.notify(&msg.0);
            self.observers.plan_changed.notify(&());
        }
    }
}

/// Spawns the orchestrator actor plus its two driving tasks (the periodic
/// timer and the live-event stream consumer), per the C10 concurrency model:
/// both feed the same single-mailbox-owner actor, never touching the engine
/// directly.
pub fn spawn<C: SimulatorClient + 'static>(
    client: C,
    params: DispatchParams,
    observers: Arc<ObserverBus>,
) -> ActorRef<OrchestratorActor<C>> {
    let client = Arc::new(client);
    let update_interval = Duration::from_secs(params.update_interval_secs);

    let factory_client = client.clone();
    let factory_observers = observers.clone();
    let actor_ref = actors::run(move || OrchestratorActor {
        engine: DispatchEngine::new(params),
        client: factory_client.clone(),
        observers: factory_observers.clone(),
    });

    tokio::spawn({
        let actor_ref = actor_ref.clone();
        async move {
            let mut interval = tokio::time::interval(update_interval);
            loop {
                interval.tick().await;
                if actor_ref.tell(Tick).await.is_err() {
                    log::error!("orchestrator actor gone, stopping periodic refresh");
                    break;
                }
            }
        }
    });

    tokio::spawn({
        let actor_ref = actor_ref.clone();
        let client = client.clone();
        async move {
            loop {
                match client.next_event().await {
                    Ok(event) => {
                        if actor_ref.tell(Deliver(event)).await.is_err() {
                            log::error!("orchestrator actor gone, stopping event task");
                            break;
                        }
                    }
                    Err(SimError::ConnectionLost) => {
                        log::error!("simulator connection lost, event task exiting");
                        break;
                    }
                    Err(SimError::Protocol(err)) => {
                        log::error!("simulator protocol error on event stream: {err}");
                    }
                }
            }
        }
    });

    actor_ref
}
