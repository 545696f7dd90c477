//! Client-side orchestration for a two-phase (commit, then reveal) on-chain
//! coin flip: the round state machine, the runtime that drives it, and the
//! wire formats it speaks with the wallet frame and the contract.

pub mod abi;
pub mod amount;
pub mod bridge;
pub mod client;
pub mod config;
pub mod gateway;
pub mod machine;
pub mod model;
pub mod notify;
pub mod sim;

pub mod test_helpers;

pub use client::{
    GameClient,
    GameHandle,
    SubmitError,
};
pub use machine::{
    Command,
    GameMachine,
    GameSnapshot,
    MachineConfig,
};
