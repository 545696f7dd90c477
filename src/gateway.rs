use crate::{
    amount::Amount,
    model::PlayerRecord,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::future::Future;
use tracing::debug;

/// Read-only queries against the coin-flip contract. Every call is
/// independently failable; amounts come back in minor units.
pub trait ContractReader: Send + Sync + 'static {
    /// `getBalance(address)`: rewards claimable by the player.
    fn reward_balance(&self, address: &str) -> impl Future<Output = Result<Amount>> + Send;

    /// `minBetAmount()`
    fn min_bet(&self) -> impl Future<Output = Result<Amount>> + Send;

    /// `calculateMaxBetAmount()`
    fn max_bet(&self) -> impl Future<Output = Result<Amount>> + Send;

    /// `gameByPlayer(address)`
    fn player_record(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<PlayerRecord>> + Send;
}

/// Results of one concurrent status refresh. Each field fails on its own.
#[derive(Debug)]
pub struct StatusBatch {
    pub reward_balance: Result<Amount>,
    pub min_bet: Result<Amount>,
    pub max_bet: Result<Amount>,
    /// Present only when the refresh asked for the player's record.
    pub record: Option<Result<PlayerRecord>>,
}

impl StatusBatch {
    /// A batch in which every requested read failed.
    pub fn failed(include_record: bool) -> Self {
        Self {
            reward_balance: Err(eyre!("reward balance read aborted")),
            min_bet: Err(eyre!("min bet read aborted")),
            max_bet: Err(eyre!("max bet read aborted")),
            record: include_record.then(|| Err(eyre!("player record read aborted"))),
        }
    }

    pub fn failures(&self) -> usize {
        [
            self.reward_balance.is_err(),
            self.min_bet.is_err(),
            self.max_bet.is_err(),
            matches!(self.record, Some(Err(_))),
        ]
        .into_iter()
        .filter(|failed| *failed)
        .count()
    }
}

/// Issues the balance and bet-limit reads (plus the record read when asked)
/// as one unordered batch and waits for all of them.
pub async fn read_status<R: ContractReader>(
    reader: &R,
    address: &str,
    include_record: bool,
) -> StatusBatch {
    debug!(%address, include_record, "reading game status");
    let record = async {
        if include_record {
            Some(reader.player_record(address).await)
        } else {
            None
        }
    };
    let (reward_balance, min_bet, max_bet, record) = futures::join!(
        reader.reward_balance(address),
        reader.min_bet(),
        reader.max_bet(),
        record,
    );
    StatusBatch {
        reward_balance,
        min_bet,
        max_bet,
        record,
    }
}
