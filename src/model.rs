use crate::amount::Amount;
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

/// Addresses supplied by the wallet bridge. Empty strings mean disconnected.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PlayerIdentity {
    pub address: String,
    pub chain_address: String,
}

impl PlayerIdentity {
    pub fn new(address: impl Into<String>, chain_address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain_address: chain_address.into(),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Contract reads and writes are keyed by the chain (hex) address.
    pub fn is_connected(&self) -> bool {
        !self.chain_address.is_empty()
    }

    pub fn short_chain_address(&self) -> String {
        let chars: Vec<char> = self.chain_address.chars().collect();
        if chars.len() <= 12 {
            return self.chain_address.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CoinSide {
    #[default]
    Logo,
    Dym,
}

impl CoinSide {
    pub fn complement(self) -> Self {
        match self {
            CoinSide::Logo => CoinSide::Dym,
            CoinSide::Dym => CoinSide::Logo,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            CoinSide::Logo => 0,
            CoinSide::Dym => 1,
        }
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(CoinSide::Logo),
            1 => Some(CoinSide::Dym),
            _ => None,
        }
    }
}

impl fmt::Display for CoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinSide::Logo => write!(f, "Logo"),
            CoinSide::Dym => write!(f, "DYM"),
        }
    }
}

/// House figures read from the contract. `None` is "not loaded yet", which
/// is distinct from a loaded zero.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GameStatus {
    pub min_bet: Option<Amount>,
    pub max_bet: Option<Amount>,
    pub reward_balance: Option<Amount>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingBet {
    /// Decimal string as entered (or as recovered from the chain).
    pub amount: String,
    pub coin_side: CoinSide,
}

/// A request for the wallet to execute a contract call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OutgoingContractMessage {
    #[serde(rename = "address")]
    pub target_address: String,
    #[serde(rename = "data")]
    pub encoded_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Won,
    Lost,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RoundPhase {
    #[default]
    Idle,
    Committing,
    AwaitingReveal,
    Revealing,
    /// Settlement landed; the outcome read is still outstanding.
    Settled,
}

impl RoundPhase {
    /// Phases in which a `PendingBet` must exist.
    pub fn holds_bet(self) -> bool {
        matches!(
            self,
            RoundPhase::Committing | RoundPhase::AwaitingReveal | RoundPhase::Revealing
        )
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundPhase::Idle => "Idle",
            RoundPhase::Committing => "Committing",
            RoundPhase::AwaitingReveal => "Awaiting reveal",
            RoundPhase::Revealing => "Revealing",
            RoundPhase::Settled => "Settled",
        };
        write!(f, "{label}")
    }
}

/// Which write a pending transaction corresponds to. The bridge reports raw
/// results only, so the machine remembers what it asked for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BroadcastTag {
    StartGame,
    CompleteGame,
}

impl fmt::Display for BroadcastTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastTag::StartGame => write!(f, "startGame"),
            BroadcastTag::CompleteGame => write!(f, "completeGame"),
        }
    }
}

/// `gameByPlayer(address).status`
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RecordStatus {
    #[default]
    None,
    Pending,
    Finished,
}

/// Decoded `gameByPlayer(address)` result.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PlayerRecord {
    pub status: RecordStatus,
    pub won: bool,
    pub player_choice: CoinSide,
    pub bet_amount: Amount,
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn complement__flips_each_side() {
        assert_eq!(CoinSide::Logo.complement(), CoinSide::Dym);
        assert_eq!(CoinSide::Dym.complement(), CoinSide::Logo);
    }

    #[test]
    fn short_chain_address__long_address__keeps_both_ends() {
        let identity = PlayerIdentity::new(
            "dym1abc",
            "0x1234567890abcdef1234567890abcdef12345678",
        );
        assert_eq!(identity.short_chain_address(), "0x1234...5678");
    }

    #[test]
    fn holds_bet__only_for_in_flight_phases() {
        assert!(!RoundPhase::Idle.holds_bet());
        assert!(RoundPhase::Committing.holds_bet());
        assert!(RoundPhase::AwaitingReveal.holds_bet());
        assert!(RoundPhase::Revealing.holds_bet());
        assert!(!RoundPhase::Settled.holds_bet());
    }

    #[test]
    fn outgoing_message__serializes_with_wire_names() {
        let message = OutgoingContractMessage {
            target_address: "0xabc".to_string(),
            encoded_data: "0x7b51b4ad".to_string(),
            value: None,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "address": "0xabc", "data": "0x7b51b4ad" })
        );
    }
}
