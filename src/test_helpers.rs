use crate::{
    abi::AbiEncoder,
    amount::Amount,
    bridge::{
        BridgeEnvelope,
        MessageBridge,
    },
    client::{
        GameClient,
        GameHandle,
        SubmitError,
    },
    gateway::ContractReader,
    machine::{
        GameMachine,
        GameSnapshot,
        MachineConfig,
    },
    model::{
        OutgoingContractMessage,
        PlayerRecord,
    },
    notify::{
        MessagePicker,
        Notification,
        NotificationSink,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use serde_json::json;
use std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};

pub const TEST_ORIGIN: &str = "http://localhost:3002";
pub const TEST_CONTRACT: &str = "0x00000000000000000000000000000000000c0170";
pub const TEST_ADDRESS: &str = "dym1player";
pub const TEST_HEX_ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ReaderState {
    reward_balance: Amount,
    min_bet: Amount,
    max_bet: Amount,
    record: PlayerRecord,
    fail_reward_balance: bool,
    fail_min_bet: bool,
    fail_max_bet: bool,
    fail_record: bool,
    panic_record: bool,
    latency: Duration,
    status_reads: usize,
    record_reads: usize,
    addresses: Vec<String>,
}

/// Scriptable contract reads. Clones share state, so a test keeps one copy
/// while the client owns another.
#[derive(Clone, Debug, Default)]
pub struct FakeReader {
    state: Arc<Mutex<ReaderState>>,
}

impl FakeReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reward_balance(&self, amount: Amount) {
        lock(&self.state).reward_balance = amount;
    }

    pub fn set_min_bet(&self, amount: Amount) {
        lock(&self.state).min_bet = amount;
    }

    pub fn set_max_bet(&self, amount: Amount) {
        lock(&self.state).max_bet = amount;
    }

    pub fn set_record(&self, record: PlayerRecord) {
        lock(&self.state).record = record;
    }

    pub fn fail_reward_balance(&self, fail: bool) {
        lock(&self.state).fail_reward_balance = fail;
    }

    pub fn fail_min_bet(&self, fail: bool) {
        lock(&self.state).fail_min_bet = fail;
    }

    pub fn fail_max_bet(&self, fail: bool) {
        lock(&self.state).fail_max_bet = fail;
    }

    pub fn fail_record(&self, fail: bool) {
        lock(&self.state).fail_record = fail;
    }

    /// The record read panics instead of answering.
    pub fn panic_record(&self, panic: bool) {
        lock(&self.state).panic_record = panic;
    }

    /// Every read sleeps this long before answering.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.state).latency = latency;
    }

    /// Number of status refreshes (counted on the reward balance read).
    pub fn status_reads(&self) -> usize {
        lock(&self.state).status_reads
    }

    pub fn record_reads(&self) -> usize {
        lock(&self.state).record_reads
    }

    pub fn addresses(&self) -> Vec<String> {
        lock(&self.state).addresses.clone()
    }

    async fn delay(&self) {
        let latency = lock(&self.state).latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl ContractReader for FakeReader {
    async fn reward_balance(&self, address: &str) -> Result<Amount> {
        {
            let mut state = lock(&self.state);
            state.status_reads += 1;
            state.addresses.push(address.to_string());
        }
        self.delay().await;
        let state = lock(&self.state);
        if state.fail_reward_balance {
            return Err(eyre!("getBalance reverted"));
        }
        Ok(state.reward_balance)
    }

    async fn min_bet(&self) -> Result<Amount> {
        self.delay().await;
        let state = lock(&self.state);
        if state.fail_min_bet {
            return Err(eyre!("minBetAmount reverted"));
        }
        Ok(state.min_bet)
    }

    async fn max_bet(&self) -> Result<Amount> {
        self.delay().await;
        let state = lock(&self.state);
        if state.fail_max_bet {
            return Err(eyre!("calculateMaxBetAmount reverted"));
        }
        Ok(state.max_bet)
    }

    async fn player_record(&self, address: &str) -> Result<PlayerRecord> {
        {
            let mut state = lock(&self.state);
            state.record_reads += 1;
            state.addresses.push(address.to_string());
        }
        self.delay().await;
        let state = lock(&self.state);
        if state.panic_record {
            drop(state);
            panic!("gameByPlayer decoder blew up");
        }
        if state.fail_record {
            return Err(eyre!("gameByPlayer reverted"));
        }
        Ok(state.record)
    }
}

/// Keeps every posted message instead of sending it anywhere.
#[derive(Clone, Debug, Default)]
pub struct RecordingBridge {
    posted: Arc<Mutex<Vec<OutgoingContractMessage>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posted(&self) -> Vec<OutgoingContractMessage> {
        lock(&self.posted).clone()
    }

    pub fn fail_posts(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }
}

impl MessageBridge for RecordingBridge {
    fn post(&self, message: &OutgoingContractMessage) -> Result<()> {
        if *lock(&self.fail) {
            return Err(eyre!("wallet frame unavailable"));
        }
        lock(&self.posted).push(message.clone());
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.received).clone()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.received)
            .iter()
            .map(|notification| notification.message.clone())
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        lock(&self.received).push(notification);
    }
}

/// A running [`GameClient`] wired to recording fakes.
pub struct TestClient {
    pub handle: GameHandle,
    pub reader: FakeReader,
    pub bridge: RecordingBridge,
    pub sink: RecordingSink,
    inbound: mpsc::Sender<BridgeEnvelope>,
    task: JoinHandle<Result<()>>,
}

impl TestClient {
    pub fn spawn(reader: FakeReader, reveal_delay: Duration) -> Self {
        let bridge = RecordingBridge::new();
        let sink = RecordingSink::new();
        let machine = GameMachine::new(
            MachineConfig {
                contract_address: TEST_CONTRACT.to_string(),
                reveal_delay,
            },
            AbiEncoder,
            MessagePicker::seeded(7),
        );
        let (inbound, inbound_rx) = mpsc::channel(32);
        let (client, handle) = GameClient::new(
            machine,
            reader.clone(),
            bridge.clone(),
            sink.clone(),
            TEST_ORIGIN,
            inbound_rx,
        );
        let task = tokio::spawn(client.run());
        Self {
            handle,
            reader,
            bridge,
            sink,
            inbound,
            task,
        }
    }

    pub async fn send_from(&self, origin: &str, data: serde_json::Value) -> Result<()> {
        self.inbound
            .send(BridgeEnvelope::new(origin, data))
            .await
            .map_err(|_| eyre!("client stopped"))
    }

    pub async fn send(&self, data: serde_json::Value) -> Result<()> {
        self.send_from(TEST_ORIGIN, data).await
    }

    /// Connects the default test identity and waits for the first refresh.
    pub async fn connect(&mut self) -> Result<GameSnapshot> {
        self.send(json!({
            "type": "connect",
            "address": TEST_ADDRESS,
            "hexAddress": TEST_HEX_ADDRESS,
        }))
        .await?;
        self.wait_for(|s| s.identity.is_connected() && !s.status_loading)
            .await
    }

    pub async fn disconnect(&mut self) -> Result<GameSnapshot> {
        self.send(json!({ "type": "disconnect" })).await?;
        self.wait_for(|s| !s.identity.is_connected()).await
    }

    pub async fn tx_delivered(&self) -> Result<()> {
        self.send(json!({ "type": "tx-response", "response": { "deliveryTxCode": 0 } }))
            .await
    }

    pub async fn tx_failed(&self, code: i64) -> Result<()> {
        self.send(json!({
            "type": "tx-response",
            "response": { "deliveryTxCode": code },
            "error": { "message": "rejected" },
        }))
        .await
    }

    /// Waits (in virtual time under a paused clock) for a matching snapshot.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&GameSnapshot) -> bool,
    ) -> Result<GameSnapshot> {
        tokio::time::timeout(Duration::from_secs(120), self.handle.wait_for(predicate))
            .await
            .map_err(|_| eyre!("timed out waiting for snapshot"))?
            .map_err(|err: SubmitError| eyre!(err))
    }

    pub async fn stop(self) -> Result<()> {
        self.handle.shutdown().await;
        self.task.await.map_err(|err| eyre!(err))?
    }
}
