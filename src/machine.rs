//! Round state machine for the coin-flip game.
//!
//! The machine never performs I/O. Every input (a bridge event, a player
//! command, a finished read, a timer) mutates the current state and returns
//! the [`Effect`]s the runtime has to carry out. Asynchronous results carry
//! the session that requested them; a result from an older session is
//! dropped, so nothing issued before a disconnect can touch the new state.

use crate::{
    abi::CallEncoder,
    amount::Amount,
    bridge::{
        BalanceEntry,
        BridgeEvent,
        TxResponse,
    },
    gateway::StatusBatch,
    model::{
        BroadcastTag,
        CoinSide,
        GameStatus,
        OutgoingContractMessage,
        Outcome,
        PendingBet,
        PlayerIdentity,
        PlayerRecord,
        RecordStatus,
        RoundPhase,
    },
    notify::{
        DELIVERY_FAILED,
        LOAD_FAILED,
        MessagePicker,
        Notification,
        OUTCOME_UNAVAILABLE,
    },
};
use color_eyre::eyre::{
    self,
    Result,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{
    debug,
    error,
    info,
    warn,
};

#[derive(Clone, Debug)]
pub struct MachineConfig {
    pub contract_address: String,
    /// Delay between a confirmed commitment and the automatic reveal.
    pub reveal_delay: Duration,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    SetBet(Option<String>),
    SetCoinSide(CoinSide),
    /// Switch to the other side of whatever is selected when this is handled.
    ToggleCoinSide,
    StartGame,
    CompleteGame,
    /// Re-read the player's record after the outcome could not be read.
    RetryOutcome,
}

/// Why a command was not accepted. Never shown to the player.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum Rejected {
    #[error("no wallet connected")]
    NotConnected,
    #[error("a contract message is already outstanding")]
    MessageOutstanding,
    #[error("command not allowed while the round is {0}")]
    WrongPhase(RoundPhase),
    #[error("bet must be a positive amount")]
    InvalidBet,
    #[error("no outcome is waiting to be read")]
    NoOutcomePending,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Read reward balance and bet limits (and the player record when asked).
    PollStatus {
        session: u64,
        address: String,
        include_record: bool,
    },
    /// Hand the message to the wallet bridge.
    Dispatch(OutgoingContractMessage),
    ScheduleReveal {
        session: u64,
        after: Duration,
    },
    CancelReveal,
    /// Read the player's record to learn how the settled round ended.
    FetchOutcome {
        session: u64,
        address: String,
    },
    Notify(Notification),
    /// Drop in-flight reads and timers from the previous session.
    Teardown,
}

/// Read-only view handed to the front-end.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameSnapshot {
    pub identity: PlayerIdentity,
    pub native_balance: Option<Amount>,
    pub status: GameStatus,
    pub status_loading: bool,
    pub phase: RoundPhase,
    pub bet_input: Option<String>,
    pub coin_side: CoinSide,
    pub pending_bet: Option<PendingBet>,
    pub broadcasting: Option<BroadcastTag>,
    pub message_outstanding: bool,
    /// A round is in motion (the coin is in the air).
    pub flipping: bool,
    pub can_reveal: bool,
    pub outcome_unresolved: bool,
    pub last_outcome: Option<Outcome>,
    pub bridge_ready: bool,
    pub menu_visible: bool,
}

pub struct GameMachine {
    config: MachineConfig,
    encoder: Box<dyn CallEncoder>,
    picker: MessagePicker,
    session: u64,
    identity: PlayerIdentity,
    native_balance: Option<Amount>,
    status: GameStatus,
    polls_in_flight: usize,
    phase: RoundPhase,
    bet_input: Option<String>,
    coin_side: CoinSide,
    pending: Option<PendingBet>,
    outgoing: Option<OutgoingContractMessage>,
    broadcasting: Option<BroadcastTag>,
    awaiting_outcome: bool,
    outcome_unresolved: bool,
    last_outcome: Option<Outcome>,
    bridge_ready: bool,
    menu_visible: bool,
}

impl GameMachine {
    pub fn new(
        config: MachineConfig,
        encoder: impl CallEncoder + 'static,
        picker: MessagePicker,
    ) -> Self {
        Self {
            config,
            encoder: Box::new(encoder),
            picker,
            session: 0,
            identity: PlayerIdentity::disconnected(),
            native_balance: None,
            status: GameStatus::default(),
            polls_in_flight: 0,
            phase: RoundPhase::Idle,
            bet_input: None,
            coin_side: CoinSide::default(),
            pending: None,
            outgoing: None,
            broadcasting: None,
            awaiting_outcome: false,
            outcome_unresolved: false,
            last_outcome: None,
            bridge_ready: false,
            menu_visible: false,
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn outgoing(&self) -> Option<&OutgoingContractMessage> {
        self.outgoing.as_ref()
    }

    /// A message waiting for the bridge, or a broadcast waiting for its result.
    pub fn has_outstanding(&self) -> bool {
        self.outgoing.is_some() || self.broadcasting.is_some()
    }

    /// `PendingBet` exists exactly while a round holds a bet, and a queued
    /// message always has a broadcast tag.
    pub fn invariants_hold(&self) -> bool {
        self.pending.is_some() == self.phase.holds_bet()
            && (self.outgoing.is_none() || self.broadcasting.is_some())
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            identity: self.identity.clone(),
            native_balance: self.native_balance,
            status: self.status,
            status_loading: self.polls_in_flight > 0,
            phase: self.phase,
            bet_input: self.bet_input.clone(),
            coin_side: self.coin_side,
            pending_bet: self.pending.clone(),
            broadcasting: self.broadcasting,
            message_outstanding: self.has_outstanding(),
            flipping: self.phase.holds_bet(),
            can_reveal: self.phase == RoundPhase::AwaitingReveal && !self.has_outstanding(),
            outcome_unresolved: self.outcome_unresolved,
            last_outcome: self.last_outcome,
            bridge_ready: self.bridge_ready,
            menu_visible: self.menu_visible,
        }
    }

    pub fn handle_event(&mut self, event: BridgeEvent) -> Vec<Effect> {
        match event {
            BridgeEvent::Ready => {
                self.bridge_ready = true;
                Vec::new()
            }
            BridgeEvent::MenuVisible { value } => {
                self.menu_visible = value;
                Vec::new()
            }
            BridgeEvent::Connect {
                address,
                hex_address,
            } => self.connect(PlayerIdentity::new(address, hex_address)),
            BridgeEvent::Disconnect => self.disconnect(),
            BridgeEvent::Balances { balances } => {
                self.update_native_balance(&balances);
                Vec::new()
            }
            BridgeEvent::TxResponse(response) => self.tx_response(response),
            BridgeEvent::Unknown => Vec::new(),
        }
    }

    pub fn submit(&mut self, command: Command) -> Result<Vec<Effect>, Rejected> {
        match command {
            Command::SetBet(bet) => {
                self.bet_input = bet
                    .map(|raw| raw.trim().to_string())
                    .filter(|raw| !raw.is_empty());
                Ok(Vec::new())
            }
            Command::SetCoinSide(side) => {
                self.coin_side = side;
                Ok(Vec::new())
            }
            Command::ToggleCoinSide => {
                self.coin_side = self.coin_side.complement();
                Ok(Vec::new())
            }
            Command::StartGame => self.start_game(),
            Command::CompleteGame => self.complete_game(),
            Command::RetryOutcome => self.retry_outcome(),
        }
    }

    /// The bridge accepted the queued message; it is no longer outstanding
    /// on our side, although its broadcast tag stays until the tx-response.
    pub fn message_dispatched(&mut self) {
        if let Some(message) = self.outgoing.take() {
            debug!(target_address = %message.target_address, "contract message handed to bridge");
        }
    }

    /// The bridge could not take the message at all.
    pub fn dispatch_failed(&mut self, err: &eyre::Report) -> Vec<Effect> {
        error!(?err, "posting contract message failed");
        self.outgoing = None;
        match self.broadcasting.take() {
            Some(tag) => self.delivery_failed(tag),
            None => Vec::new(),
        }
    }

    pub fn apply_status(&mut self, session: u64, batch: StatusBatch) -> Vec<Effect> {
        if session != self.session || !self.identity.is_connected() {
            debug!(session, current = self.session, "dropping stale status read");
            return Vec::new();
        }
        self.polls_in_flight = self.polls_in_flight.saturating_sub(1);
        let failures = batch.failures();

        match batch.reward_balance {
            Ok(amount) => self.status.reward_balance = Some(amount),
            Err(err) => error!(?err, "reading reward balance failed"),
        }
        match batch.min_bet {
            Ok(amount) => self.status.min_bet = Some(amount),
            Err(err) => error!(?err, "reading min bet failed"),
        }
        match batch.max_bet {
            Ok(amount) => self.status.max_bet = Some(amount),
            Err(err) => error!(?err, "reading max bet failed"),
        }
        match batch.record {
            Some(Ok(record)) => self.recover_round(record),
            Some(Err(err)) => error!(?err, "reading player record failed"),
            None => {}
        }

        if failures > 0 {
            vec![Effect::Notify(Notification::error(LOAD_FAILED))]
        } else {
            Vec::new()
        }
    }

    pub fn apply_outcome(&mut self, session: u64, result: Result<PlayerRecord>) -> Vec<Effect> {
        if session != self.session || !self.awaiting_outcome {
            debug!(session, current = self.session, "dropping stale outcome read");
            return Vec::new();
        }
        self.awaiting_outcome = false;
        if self.phase == RoundPhase::Settled {
            self.phase = RoundPhase::Idle;
        }

        let record = match result {
            Ok(record) if record.status == RecordStatus::Finished => record,
            Ok(record) => {
                warn!(status = ?record.status, "player record not finished after settlement");
                self.outcome_unresolved = true;
                return vec![Effect::Notify(Notification::error(OUTCOME_UNAVAILABLE))];
            }
            Err(err) => {
                error!(?err, "reading game outcome failed");
                self.outcome_unresolved = true;
                return vec![Effect::Notify(Notification::error(OUTCOME_UNAVAILABLE))];
            }
        };

        self.outcome_unresolved = false;
        if record.won {
            info!("round won");
            self.last_outcome = Some(Outcome::Won);
            vec![Effect::Notify(Notification::success(self.picker.success()))]
        } else {
            info!("round lost");
            self.last_outcome = Some(Outcome::Lost);
            self.coin_side = record.player_choice.complement();
            vec![Effect::Notify(Notification::error(self.picker.loss()))]
        }
    }

    /// The reveal window elapsed.
    pub fn reveal_due(&mut self, session: u64) -> Vec<Effect> {
        if session != self.session {
            debug!(session, current = self.session, "dropping stale reveal timer");
            return Vec::new();
        }
        match self.complete_game() {
            Ok(effects) => {
                info!("reveal window elapsed; requesting settlement");
                effects
            }
            Err(reason) => {
                debug!(%reason, "automatic reveal skipped");
                Vec::new()
            }
        }
    }

    fn connect(&mut self, identity: PlayerIdentity) -> Vec<Effect> {
        if !identity.is_connected() {
            return self.disconnect();
        }
        if identity == self.identity {
            debug!("bridge re-announced the connected identity");
            return Vec::new();
        }
        info!(address = %identity.chain_address, "wallet connected");
        self.reset_round();
        self.session += 1;
        self.identity = identity;
        vec![Effect::Teardown, self.poll(true)]
    }

    fn disconnect(&mut self) -> Vec<Effect> {
        info!("wallet disconnected");
        self.reset_round();
        self.session += 1;
        self.identity = PlayerIdentity::disconnected();
        self.native_balance = None;
        vec![Effect::Teardown]
    }

    fn reset_round(&mut self) {
        self.phase = RoundPhase::Idle;
        self.pending = None;
        self.outgoing = None;
        self.broadcasting = None;
        self.status = GameStatus::default();
        self.polls_in_flight = 0;
        self.awaiting_outcome = false;
        self.outcome_unresolved = false;
        self.last_outcome = None;
    }

    fn update_native_balance(&mut self, balances: &[BalanceEntry]) {
        let raw = balances.first().map(|entry| entry.amount.as_str()).unwrap_or("0");
        let raw = if raw.is_empty() { "0" } else { raw };
        match Amount::from_minor_str(raw) {
            Ok(amount) => self.native_balance = Some(amount),
            Err(err) => warn!(%err, raw, "unparseable wallet balance"),
        }
    }

    fn poll(&mut self, include_record: bool) -> Effect {
        self.polls_in_flight += 1;
        Effect::PollStatus {
            session: self.session,
            address: self.identity.chain_address.clone(),
            include_record,
        }
    }

    fn ensure_can_write(&self) -> Result<(), Rejected> {
        if !self.identity.is_connected() {
            return Err(Rejected::NotConnected);
        }
        if self.has_outstanding() {
            return Err(Rejected::MessageOutstanding);
        }
        Ok(())
    }

    fn start_game(&mut self) -> Result<Vec<Effect>, Rejected> {
        self.ensure_can_write()?;
        if self.phase != RoundPhase::Idle {
            return Err(Rejected::WrongPhase(self.phase));
        }
        let bet = self.bet_input.clone().ok_or(Rejected::InvalidBet)?;
        let amount = Amount::parse_decimal(&bet).map_err(|_| Rejected::InvalidBet)?;
        if amount.is_zero() {
            return Err(Rejected::InvalidBet);
        }

        let message = OutgoingContractMessage {
            target_address: self.config.contract_address.clone(),
            encoded_data: self.encoder.start_game(self.coin_side),
            value: Some(amount.to_minor_string()),
        };
        info!(bet = %bet, side = %self.coin_side, "starting game");
        self.pending = Some(PendingBet {
            amount: bet,
            coin_side: self.coin_side,
        });
        self.phase = RoundPhase::Committing;
        self.outgoing = Some(message.clone());
        self.broadcasting = Some(BroadcastTag::StartGame);
        // an outcome read still in flight belongs to the previous round
        self.awaiting_outcome = false;
        self.outcome_unresolved = false;
        self.last_outcome = None;
        Ok(vec![Effect::Dispatch(message)])
    }

    fn complete_game(&mut self) -> Result<Vec<Effect>, Rejected> {
        self.ensure_can_write()?;
        if self.phase != RoundPhase::AwaitingReveal {
            return Err(Rejected::WrongPhase(self.phase));
        }

        let message = OutgoingContractMessage {
            target_address: self.config.contract_address.clone(),
            encoded_data: self.encoder.complete_game(),
            value: None,
        };
        info!("completing game");
        self.phase = RoundPhase::Revealing;
        self.outgoing = Some(message.clone());
        self.broadcasting = Some(BroadcastTag::CompleteGame);
        Ok(vec![Effect::CancelReveal, Effect::Dispatch(message)])
    }

    fn retry_outcome(&mut self) -> Result<Vec<Effect>, Rejected> {
        if !self.identity.is_connected() {
            return Err(Rejected::NotConnected);
        }
        if !self.outcome_unresolved || self.awaiting_outcome {
            return Err(Rejected::NoOutcomePending);
        }
        self.outcome_unresolved = false;
        self.awaiting_outcome = true;
        Ok(vec![self.fetch_outcome()])
    }

    fn fetch_outcome(&self) -> Effect {
        Effect::FetchOutcome {
            session: self.session,
            address: self.identity.chain_address.clone(),
        }
    }

    fn tx_response(&mut self, response: TxResponse) -> Vec<Effect> {
        self.outgoing = None;
        let Some(tag) = self.broadcasting.take() else {
            warn!(?response, "tx-response without a broadcast in flight");
            return Vec::new();
        };
        if !response.is_delivered() {
            error!(
                %tag,
                code = ?response.delivery_code(),
                error = ?response.error,
                "transaction delivery failed"
            );
            return self.delivery_failed(tag);
        }

        match tag {
            BroadcastTag::StartGame => {
                info!("bet committed; waiting for the reveal window");
                self.phase = RoundPhase::AwaitingReveal;
                vec![
                    self.poll(false),
                    Effect::ScheduleReveal {
                        session: self.session,
                        after: self.config.reveal_delay,
                    },
                ]
            }
            BroadcastTag::CompleteGame => {
                info!("round settled; reading outcome");
                self.pending = None;
                self.phase = RoundPhase::Settled;
                self.awaiting_outcome = true;
                vec![self.poll(false), self.fetch_outcome()]
            }
        }
    }

    fn delivery_failed(&mut self, tag: BroadcastTag) -> Vec<Effect> {
        match tag {
            BroadcastTag::StartGame => {
                self.phase = RoundPhase::Idle;
                self.pending = None;
            }
            // keep the bet so the player can retry the reveal
            BroadcastTag::CompleteGame => self.phase = RoundPhase::AwaitingReveal,
        }
        vec![Effect::Notify(Notification::error(DELIVERY_FAILED))]
    }

    fn recover_round(&mut self, record: PlayerRecord) {
        if record.status != RecordStatus::Pending {
            return;
        }
        if self.phase != RoundPhase::Idle || self.has_outstanding() {
            debug!(phase = %self.phase, "not recovering pending round; a round is already tracked");
            return;
        }
        let amount = record.bet_amount.to_decimal_string();
        info!(bet = %amount, side = %record.player_choice, "recovered pending round from chain");
        self.pending = Some(PendingBet {
            amount: amount.clone(),
            coin_side: record.player_choice,
        });
        self.bet_input = Some(amount);
        self.coin_side = record.player_choice;
        self.phase = RoundPhase::AwaitingReveal;
    }
}

impl std::fmt::Debug for GameMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameMachine")
            .field("session", &self.session)
            .field("identity", &self.identity)
            .field("phase", &self.phase)
            .field("pending", &self.pending)
            .field("broadcasting", &self.broadcasting)
            .finish_non_exhaustive()
    }
}
