//! Call data for the coin-flip contract's write methods.
//!
//! Only the two writes the client issues are encoded here; reads go through
//! the [`crate::gateway::ContractReader`] implementation.

use crate::model::CoinSide;

/// `keccak256("startGame(uint8)")[..4]`
pub const START_GAME_SELECTOR: [u8; 4] = [0xe6, 0xab, 0x60, 0x79];
/// `keccak256("completeGame()")[..4]`
pub const COMPLETE_GAME_SELECTOR: [u8; 4] = [0x7b, 0x51, 0xb4, 0xad];

const WORD: usize = 32;

pub trait CallEncoder: Send + Sync {
    fn start_game(&self, side: CoinSide) -> String;

    fn complete_game(&self) -> String;
}

/// Solidity ABI encoding: selector followed by 32-byte big-endian words.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbiEncoder;

impl CallEncoder for AbiEncoder {
    fn start_game(&self, side: CoinSide) -> String {
        let mut data = Vec::with_capacity(4 + WORD);
        data.extend_from_slice(&START_GAME_SELECTOR);
        let mut word = [0u8; WORD];
        word[WORD - 1] = side.as_u8();
        data.extend_from_slice(&word);
        format!("0x{}", hex::encode(data))
    }

    fn complete_game(&self) -> String {
        format!("0x{}", hex::encode(COMPLETE_GAME_SELECTOR))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContractCall {
    StartGame(CoinSide),
    CompleteGame,
}

/// Recovers the call from `0x`-prefixed call data. Unknown selectors,
/// truncated arguments and out-of-range sides yield `None`.
pub fn decode_call(data: &str) -> Option<ContractCall> {
    let raw = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(raw).ok()?;
    if bytes.len() < 4 {
        return None;
    }
    let (selector, args) = bytes.split_at(4);
    if selector == START_GAME_SELECTOR {
        if args.len() != WORD || args[..WORD - 1].iter().any(|b| *b != 0) {
            return None;
        }
        CoinSide::from_u8(args[WORD - 1]).map(ContractCall::StartGame)
    } else if selector == COMPLETE_GAME_SELECTOR && args.is_empty() {
        Some(ContractCall::CompleteGame)
    } else {
        None
    }
}
