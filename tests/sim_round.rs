#![allow(non_snake_case)]
use coinflip_client::{
    GameClient,
    GameHandle,
    abi::AbiEncoder,
    amount::Amount,
    config::{
        FlipMode,
        SimConfig,
    },
    machine::{
        Command,
        GameMachine,
        GameSnapshot,
        MachineConfig,
    },
    model::{
        CoinSide,
        Outcome,
        RoundPhase,
    },
    notify::{
        DELIVERY_FAILED,
        Level,
        MessagePicker,
    },
    sim::{
        SimHouse,
        SimWallet,
    },
    test_helpers::{
        RecordingSink,
        TEST_CONTRACT,
        TEST_ORIGIN,
    },
};
use std::time::Duration;
use tokio::sync::mpsc;

const REVEAL: Duration = Duration::from_secs(6);

struct SimTable {
    handle: GameHandle,
    house: SimHouse,
    wallet: SimWallet,
    sink: RecordingSink,
}

fn amount(raw: &str) -> Amount {
    Amount::parse_decimal(raw).unwrap()
}

fn sim_table(flip: FlipMode) -> SimTable {
    let config = SimConfig {
        flip,
        seed: Some(11),
        ..SimConfig::default()
    };
    let house = SimHouse::new(&config).unwrap();
    let (inbound_tx, inbound_rx) = mpsc::channel(32);
    let wallet = SimWallet::new(house.clone(), &config, TEST_ORIGIN, inbound_tx).unwrap();
    let sink = RecordingSink::new();
    let machine = GameMachine::new(
        MachineConfig {
            contract_address: TEST_CONTRACT.to_string(),
            reveal_delay: REVEAL,
        },
        AbiEncoder,
        MessagePicker::seeded(1),
    );
    let (client, handle) = GameClient::new(
        machine,
        house.clone(),
        wallet.clone(),
        sink.clone(),
        TEST_ORIGIN,
        inbound_rx,
    );
    tokio::spawn(client.run());
    SimTable {
        handle,
        house,
        wallet,
        sink,
    }
}

impl SimTable {
    async fn wait_for(&mut self, predicate: impl FnMut(&GameSnapshot) -> bool) -> GameSnapshot {
        tokio::time::timeout(Duration::from_secs(120), self.handle.wait_for(predicate))
            .await
            .unwrap()
            .unwrap()
    }

    async fn connect(&mut self) -> GameSnapshot {
        self.wallet.connect().await.unwrap();
        self.wait_for(|s| {
            s.identity.is_connected() && s.native_balance.is_some() && !s.status_loading
        })
        .await
    }

    async fn bet(&self, raw: &str, side: CoinSide) {
        self.handle
            .submit(Command::SetBet(Some(raw.to_string())))
            .await
            .unwrap();
        self.handle.submit(Command::SetCoinSide(side)).await.unwrap();
        self.handle.submit(Command::StartGame).await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn sim_round__fixed_win__credits_rewards_after_automatic_reveal() {
    // given
    let mut table = sim_table(FlipMode::Fixed(true));
    let connected = table.connect().await;

    // when
    table.bet("5", CoinSide::Dym).await;
    let snap = table
        .wait_for(|s| s.last_outcome.is_some() && !s.status_loading)
        .await;

    // then
    assert_eq!(connected.status.max_bet, Some(amount("50")));
    assert_eq!(snap.last_outcome, Some(Outcome::Won));
    assert_eq!(snap.phase, RoundPhase::Idle);
    assert_eq!(snap.status.reward_balance, Some(amount("10")));
    assert_eq!(snap.native_balance, Some(amount("95")));
    assert_eq!(table.wallet.balance(), amount("95"));
    assert_eq!(table.house.bankroll(), amount("995"));
    let notes = table.sink.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, Level::Success);
}

#[tokio::test(start_paused = true)]
async fn sim_round__fixed_loss__shows_the_side_that_landed() {
    // given
    let mut table = sim_table(FlipMode::Fixed(false));
    table.connect().await;

    // when
    table.bet("2", CoinSide::Logo).await;
    let snap = table.wait_for(|s| s.last_outcome.is_some()).await;

    // then
    assert_eq!(snap.last_outcome, Some(Outcome::Lost));
    assert_eq!(snap.coin_side, CoinSide::Dym);
    assert_eq!(table.house.bankroll(), amount("1002"));
    let notes = table.sink.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, Level::Error);
}

#[tokio::test(start_paused = true)]
async fn sim_round__bet_above_house_limit__fails_delivery_and_keeps_funds() {
    // given
    let mut table = sim_table(FlipMode::Fixed(true));
    table.connect().await;

    // when
    table.bet("60", CoinSide::Logo).await;
    let snap = table
        .wait_for(|s| s.phase == RoundPhase::Idle && !s.message_outstanding)
        .await;

    // then
    assert_eq!(snap.pending_bet, None);
    assert_eq!(table.wallet.balance(), amount("100"));
    assert_eq!(table.sink.messages(), vec![DELIVERY_FAILED.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn sim_round__second_round_after_win__starts_cleanly() {
    // given
    let mut table = sim_table(FlipMode::Fixed(true));
    table.connect().await;
    table.bet("1", CoinSide::Logo).await;
    table.wait_for(|s| s.last_outcome.is_some()).await;

    // when
    table.house.set_flip(FlipMode::Fixed(false));
    table.bet("1", CoinSide::Logo).await;
    let snap = table
        .wait_for(|s| s.last_outcome == Some(Outcome::Lost))
        .await;

    // then
    assert_eq!(snap.phase, RoundPhase::Idle);
    assert_eq!(table.wallet.balance(), amount("98"));
    assert_eq!(table.sink.notifications().len(), 2);
}
