use crate::{
    bridge::{
        BridgeEnvelope,
        BridgeEvent,
        MessageBridge,
    },
    gateway::{
        ContractReader,
        StatusBatch,
        read_status,
    },
    machine::{
        Command,
        Effect,
        GameMachine,
        GameSnapshot,
        Rejected,
    },
    model::PlayerRecord,
    notify::NotificationSink,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use futures::FutureExt;
use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    sync::{
        mpsc,
        oneshot,
        watch,
    },
    task::JoinSet,
    time::{
        self,
        Instant,
    },
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

const COMMAND_BUFFER: usize = 16;

enum ClientCommand {
    Submit(Command, oneshot::Sender<Result<(), Rejected>>),
    Shutdown,
}

enum ReadOutcome {
    Status {
        session: u64,
        batch: StatusBatch,
    },
    Outcome {
        session: u64,
        result: Result<PlayerRecord>,
    },
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] Rejected),
    #[error("game client has stopped")]
    Closed,
}

/// Owns the [`GameMachine`] and executes its effects: contract reads run on
/// a [`JoinSet`], writes go to the bridge, and the reveal timer is a single
/// deadline polled by the main loop.
pub struct GameClient<Reader, Bridge, Sink> {
    machine: GameMachine,
    reader: Arc<Reader>,
    bridge: Bridge,
    sink: Sink,
    trusted_origin: String,
    inbound: mpsc::Receiver<BridgeEnvelope>,
    commands: mpsc::Receiver<ClientCommand>,
    snapshots: watch::Sender<GameSnapshot>,
    reads: JoinSet<ReadOutcome>,
    reveal_at: Option<(u64, Instant)>,
}

impl<Reader, Bridge, Sink> GameClient<Reader, Bridge, Sink>
where
    Reader: ContractReader,
    Bridge: MessageBridge,
    Sink: NotificationSink,
{
    pub fn new(
        machine: GameMachine,
        reader: Reader,
        bridge: Bridge,
        sink: Sink,
        trusted_origin: impl Into<String>,
        inbound: mpsc::Receiver<BridgeEnvelope>,
    ) -> (Self, GameHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());
        let client = Self {
            machine,
            reader: Arc::new(reader),
            bridge,
            sink,
            trusted_origin: trusted_origin.into(),
            inbound,
            commands: command_rx,
            snapshots: snapshot_tx,
            reads: JoinSet::new(),
            reveal_at: None,
        };
        let handle = GameHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (client, handle)
    }

    pub async fn run(mut self) -> Result<()> {
        info!(origin = %self.trusted_origin, "game client running");
        loop {
            let reveal_at = self.reveal_at;
            let deadline = reveal_at.map(|(_, at)| at).unwrap_or_else(Instant::now);
            tokio::select! {
                envelope = self.inbound.recv() => {
                    let Some(envelope) = envelope else {
                        warn!("bridge channel closed");
                        break;
                    };
                    if let Some(event) = BridgeEvent::from_envelope(&envelope, &self.trusted_origin) {
                        debug!(?event, "bridge event");
                        let effects = self.machine.handle_event(event);
                        self.execute(effects);
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(ClientCommand::Submit(command, reply)) => {
                            debug!(?command, "player command");
                            let result = self
                                .machine
                                .submit(command)
                                .map(|effects| self.execute(effects));
                            if let Err(reason) = &result {
                                debug!(%reason, "command rejected");
                            }
                            // the caller may read the snapshot as soon as it hears back
                            self.publish();
                            let _ = reply.send(result);
                        }
                        Some(ClientCommand::Shutdown) | None => break,
                    }
                }
                Some(joined) = self.reads.join_next(), if !self.reads.is_empty() => {
                    match joined {
                        Ok(ReadOutcome::Status { session, batch }) => {
                            let effects = self.machine.apply_status(session, batch);
                            self.execute(effects);
                        }
                        Ok(ReadOutcome::Outcome { session, result }) => {
                            let effects = self.machine.apply_outcome(session, result);
                            self.execute(effects);
                        }
                        Err(err) if err.is_cancelled() => {}
                        Err(err) => error!(?err, "contract read task failed"),
                    }
                }
                _ = time::sleep_until(deadline), if reveal_at.is_some() => {
                    if let Some((session, _)) = self.reveal_at.take() {
                        let effects = self.machine.reveal_due(session);
                        self.execute(effects);
                    }
                }
            }
            self.publish();
        }
        info!("game client stopping");
        self.reads.shutdown().await;
        Ok(())
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PollStatus {
                    session,
                    address,
                    include_record,
                } => {
                    let reader = Arc::clone(&self.reader);
                    self.reads.spawn(async move {
                        let read = read_status(reader.as_ref(), &address, include_record);
                        let batch = AssertUnwindSafe(read)
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                error!("status read panicked");
                                StatusBatch::failed(include_record)
                            });
                        ReadOutcome::Status { session, batch }
                    });
                }
                Effect::FetchOutcome { session, address } => {
                    let reader = Arc::clone(&self.reader);
                    self.reads.spawn(async move {
                        let result = AssertUnwindSafe(reader.player_record(&address))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| Err(eyre!("player record read panicked")));
                        ReadOutcome::Outcome { session, result }
                    });
                }
                Effect::Dispatch(message) => match self.bridge.post(&message) {
                    Ok(()) => self.machine.message_dispatched(),
                    Err(err) => {
                        let follow_up = self.machine.dispatch_failed(&err);
                        self.execute(follow_up);
                    }
                },
                Effect::ScheduleReveal { session, after } => {
                    debug!(?after, "reveal scheduled");
                    self.reveal_at = Some((session, Instant::now() + after));
                }
                Effect::CancelReveal => self.reveal_at = None,
                Effect::Notify(notification) => self.sink.notify(notification),
                Effect::Teardown => {
                    self.reads.abort_all();
                    self.reveal_at = None;
                }
            }
        }
    }

    fn publish(&self) {
        let next = self.machine.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Front-end side of a running [`GameClient`].
#[derive(Clone, Debug)]
pub struct GameHandle {
    commands: mpsc::Sender<ClientCommand>,
    snapshots: watch::Receiver<GameSnapshot>,
}

impl GameHandle {
    pub async fn submit(&self, command: Command) -> Result<(), SubmitError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::Submit(command, reply_tx))
            .await
            .map_err(|_| SubmitError::Closed)?;
        reply_rx.await.map_err(|_| SubmitError::Closed)??;
        Ok(())
    }

    pub fn snapshot(&self) -> GameSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Waits for the next published snapshot.
    pub async fn changed(&mut self) -> Result<GameSnapshot, SubmitError> {
        self.snapshots
            .changed()
            .await
            .map_err(|_| SubmitError::Closed)?;
        Ok(self.snapshots.borrow_and_update().clone())
    }

    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&GameSnapshot) -> bool,
    ) -> Result<GameSnapshot, SubmitError> {
        let snapshot = self
            .snapshots
            .wait_for(predicate)
            .await
            .map_err(|_| SubmitError::Closed)?;
        Ok(snapshot.clone())
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(ClientCommand::Shutdown).await;
    }
}

impl std::fmt::Debug for ClientCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientCommand::Submit(command, _) => f.debug_tuple("Submit").field(command).finish(),
            ClientCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}
