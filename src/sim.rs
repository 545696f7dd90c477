//! In-process stand-in for the coin-flip contract and the wallet frame.
//!
//! [`SimHouse`] keeps the contract state the client reads; [`SimWallet`]
//! accepts the client's outgoing messages, applies them to the house after a
//! delay and answers on the inbound channel the way the wallet frame does.

use crate::{
    abi::{
        ContractCall,
        decode_call,
    },
    amount::Amount,
    bridge::{
        BridgeEnvelope,
        MessageBridge,
    },
    config::{
        FlipMode,
        SimConfig,
    },
    gateway::ContractReader,
    model::{
        CoinSide,
        OutgoingContractMessage,
        PlayerRecord,
        RecordStatus,
    },
};
use color_eyre::eyre::{
    Report,
    Result,
    WrapErr,
    eyre,
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{
    debug,
    info,
    warn,
};

/// Delivery code reported when the house rejects a call.
pub const REVERTED: i64 = 1;
/// Delivery code reported when the wallet cannot cover the attached value.
pub const INSUFFICIENT_FUNDS: i64 = 5;

#[derive(Debug)]
struct HouseState {
    bankroll: Amount,
    min_bet: Amount,
    max_bet_divisor: u128,
    rewards: HashMap<String, Amount>,
    games: HashMap<String, PlayerRecord>,
    flip: FlipMode,
    rng: StdRng,
    latency: Duration,
}

#[derive(Clone, Debug)]
pub struct SimHouse {
    state: Arc<Mutex<HouseState>>,
}

impl SimHouse {
    pub fn new(config: &SimConfig) -> Result<Self> {
        let bankroll = Amount::parse_decimal(&config.bankroll)
            .wrap_err("invalid sim bankroll")?;
        let min_bet = Amount::parse_decimal(&config.min_bet).wrap_err("invalid sim min bet")?;
        if config.max_bet_divisor == 0 {
            return Err(eyre!("sim max_bet_divisor must be positive"));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let state = HouseState {
            bankroll,
            min_bet,
            max_bet_divisor: u128::from(config.max_bet_divisor),
            rewards: HashMap::new(),
            games: HashMap::new(),
            flip: config.flip,
            rng,
            latency: config.latency(),
        };
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn set_flip(&self, flip: FlipMode) {
        self.state().flip = flip;
    }

    pub fn bankroll(&self) -> Amount {
        self.state().bankroll
    }

    /// Records a pending game for `player`. Reverts (returns `Err`) when the
    /// player already has one or the bet is outside the limits.
    pub fn start_game(&self, player: &str, side: CoinSide, bet: Amount) -> Result<()> {
        let mut state = self.state();
        if state
            .games
            .get(player)
            .is_some_and(|game| game.status == RecordStatus::Pending)
        {
            return Err(eyre!("game already in progress"));
        }
        if bet < state.min_bet {
            return Err(eyre!("bet below minimum"));
        }
        if bet > state.max_bet() {
            return Err(eyre!("bet above maximum"));
        }
        state.bankroll = Amount::from_minor(state.bankroll.minor().saturating_add(bet.minor()));
        state.games.insert(
            player.to_string(),
            PlayerRecord {
                status: RecordStatus::Pending,
                won: false,
                player_choice: side,
                bet_amount: bet,
            },
        );
        debug!(%player, %side, %bet, "sim game started");
        Ok(())
    }

    /// Flips the coin for the player's pending game and credits a win as
    /// twice the bet to the reward balance.
    pub fn complete_game(&self, player: &str) -> Result<bool> {
        let mut state = self.state();
        let game = match state.games.get(player) {
            Some(game) if game.status == RecordStatus::Pending => *game,
            _ => return Err(eyre!("no game in progress")),
        };
        let won = match state.flip {
            FlipMode::Fixed(won) => won,
            FlipMode::Pseudo => state.rng.random_bool(0.5),
        };
        if won {
            let payout = game.bet_amount.minor().saturating_mul(2);
            state.bankroll = Amount::from_minor(state.bankroll.minor().saturating_sub(payout));
            let reward = state.rewards.entry(player.to_string()).or_default();
            *reward = Amount::from_minor(reward.minor().saturating_add(payout));
        }
        state.games.insert(
            player.to_string(),
            PlayerRecord {
                status: RecordStatus::Finished,
                won,
                ..game
            },
        );
        info!(%player, won, "sim game completed");
        Ok(won)
    }

    fn latency(&self) -> Duration {
        self.state().latency
    }

    fn state(&self) -> MutexGuard<'_, HouseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HouseState {
    fn max_bet(&self) -> Amount {
        Amount::from_minor(self.bankroll.minor() / self.max_bet_divisor)
    }
}

impl ContractReader for SimHouse {
    async fn reward_balance(&self, address: &str) -> Result<Amount> {
        tokio::time::sleep(self.latency()).await;
        Ok(self.state().rewards.get(address).copied().unwrap_or_default())
    }

    async fn min_bet(&self) -> Result<Amount> {
        tokio::time::sleep(self.latency()).await;
        Ok(self.state().min_bet)
    }

    async fn max_bet(&self) -> Result<Amount> {
        tokio::time::sleep(self.latency()).await;
        Ok(self.state().max_bet())
    }

    async fn player_record(&self, address: &str) -> Result<PlayerRecord> {
        tokio::time::sleep(self.latency()).await;
        Ok(self.state().games.get(address).copied().unwrap_or_default())
    }
}

#[derive(Debug)]
struct WalletState {
    balance: Amount,
    connected: bool,
}

/// Simulated wallet frame. Events are posted to the client's inbound
/// channel from `origin`.
#[derive(Clone, Debug)]
pub struct SimWallet {
    house: SimHouse,
    origin: String,
    address: String,
    hex_address: String,
    latency: Duration,
    state: Arc<Mutex<WalletState>>,
    events: mpsc::Sender<BridgeEnvelope>,
}

impl SimWallet {
    pub fn new(
        house: SimHouse,
        config: &SimConfig,
        origin: impl Into<String>,
        events: mpsc::Sender<BridgeEnvelope>,
    ) -> Result<Self> {
        let balance = Amount::parse_decimal(&config.wallet_balance)
            .wrap_err("invalid sim wallet balance")?;
        Ok(Self {
            house,
            origin: origin.into(),
            address: config.player_address.clone(),
            hex_address: config.player_hex_address.clone(),
            latency: config.latency(),
            state: Arc::new(Mutex::new(WalletState {
                balance,
                connected: false,
            })),
            events,
        })
    }

    pub fn balance(&self) -> Amount {
        self.state().balance
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub async fn announce_ready(&self) -> Result<()> {
        self.emit(json!({ "type": "ready" })).await
    }

    pub async fn connect(&self) -> Result<()> {
        self.state().connected = true;
        self.emit(json!({
            "type": "connect",
            "address": self.address,
            "hexAddress": self.hex_address,
        }))
        .await?;
        self.emit_balance().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.state().connected = false;
        self.emit(json!({ "type": "disconnect" })).await
    }

    async fn emit_balance(&self) -> Result<()> {
        let balance = self.balance();
        self.emit(json!({
            "type": "balances",
            "balances": [{ "amount": balance.to_minor_string(), "denom": "adym" }],
        }))
        .await
    }

    async fn emit(&self, data: serde_json::Value) -> Result<()> {
        self.events
            .send(BridgeEnvelope::new(self.origin.clone(), data))
            .await
            .map_err(|_| eyre!("client inbound channel closed"))
    }

    /// Applies a contract call and reports the delivery code.
    async fn execute(&self, message: OutgoingContractMessage) -> Result<()> {
        tokio::time::sleep(self.latency).await;
        let response = match self.apply(&message) {
            Ok(()) => json!({ "type": "tx-response", "response": { "deliveryTxCode": 0 } }),
            Err((code, err)) => {
                warn!(code, %err, "sim transaction failed");
                json!({
                    "type": "tx-response",
                    "response": { "deliveryTxCode": code },
                    "error": { "message": format!("{err}") },
                })
            }
        };
        self.emit(response).await?;
        self.emit_balance().await
    }

    fn apply(&self, message: &OutgoingContractMessage) -> Result<(), (i64, Report)> {
        if !self.is_connected() {
            return Err((REVERTED, eyre!("wallet not connected")));
        }
        let call = decode_call(&message.encoded_data)
            .ok_or_else(|| (REVERTED, eyre!("unrecognised call data")))?;
        let value = match message.value.as_deref() {
            Some(raw) => Amount::from_minor_str(raw).map_err(|err| (REVERTED, eyre!(err)))?,
            None => Amount::ZERO,
        };
        match call {
            ContractCall::StartGame(side) => {
                let mut wallet = self.state();
                if value > wallet.balance {
                    return Err((INSUFFICIENT_FUNDS, eyre!("insufficient funds")));
                }
                self.house
                    .start_game(&self.hex_address, side, value)
                    .map_err(|err| (REVERTED, err))?;
                wallet.balance = Amount::from_minor(wallet.balance.minor() - value.minor());
                Ok(())
            }
            ContractCall::CompleteGame => self
                .house
                .complete_game(&self.hex_address)
                .map(|_| ())
                .map_err(|err| (REVERTED, err)),
        }
    }

    fn state(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageBridge for SimWallet {
    fn post(&self, message: &OutgoingContractMessage) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .wrap_err("sim wallet needs a running tokio runtime")?;
        debug!(data = %message.encoded_data, "sim wallet received transaction");
        let wallet = self.clone();
        let message = message.clone();
        runtime.spawn(async move {
            if let Err(err) = wallet.execute(message).await {
                warn!(?err, "sim wallet could not answer");
            }
        });
        Ok(())
    }
}
