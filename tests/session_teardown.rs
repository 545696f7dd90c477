#![allow(non_snake_case)]
use coinflip_client::{
    amount::Amount,
    machine::Command,
    model::{
        CoinSide,
        GameStatus,
        PendingBet,
        PlayerRecord,
        RecordStatus,
        RoundPhase,
    },
    notify::LOAD_FAILED,
    test_helpers::{
        FakeReader,
        TEST_ADDRESS,
        TEST_HEX_ADDRESS,
        TestClient,
    },
};
use serde_json::json;
use std::time::Duration;

const REVEAL: Duration = Duration::from_secs(6);

fn amount(raw: &str) -> Amount {
    Amount::parse_decimal(raw).unwrap()
}

fn house() -> FakeReader {
    let reader = FakeReader::new();
    reader.set_min_bet(amount("0.1"));
    reader.set_max_bet(amount("50"));
    reader
}

async fn awaiting_reveal(reader: FakeReader) -> TestClient {
    let mut ctx = TestClient::spawn(reader, REVEAL);
    ctx.connect().await.unwrap();
    ctx.handle
        .submit(Command::SetBet(Some("1".to_string())))
        .await
        .unwrap();
    ctx.handle.submit(Command::StartGame).await.unwrap();
    ctx.tx_delivered().await.unwrap();
    ctx.wait_for(|s| s.phase == RoundPhase::AwaitingReveal && !s.status_loading)
        .await
        .unwrap();
    ctx
}

#[tokio::test(start_paused = true)]
async fn disconnect__reads_in_flight__late_results_never_land() {
    // given
    let reader = house();
    reader.set_latency(Duration::from_secs(5));
    reader.fail_max_bet(true);
    let mut ctx = TestClient::spawn(reader, REVEAL);
    ctx.send(json!({
        "type": "connect",
        "address": TEST_ADDRESS,
        "hexAddress": TEST_HEX_ADDRESS,
    }))
    .await
    .unwrap();
    ctx.wait_for(|s| s.identity.is_connected() && s.status_loading)
        .await
        .unwrap();

    // when
    ctx.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    // then
    let snap = ctx.handle.snapshot();
    assert_eq!(snap.status, GameStatus::default());
    assert!(!snap.status_loading);
    assert!(ctx.sink.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect__awaiting_reveal__clears_round_and_timer() {
    // given
    let mut ctx = awaiting_reveal(house()).await;

    // when
    let snap = ctx.disconnect().await.unwrap();
    tokio::time::sleep(REVEAL * 3).await;

    // then
    assert_eq!(snap.phase, RoundPhase::Idle);
    assert_eq!(snap.pending_bet, None);
    assert!(!snap.message_outstanding);
    assert_eq!(snap.native_balance, None);
    assert_eq!(ctx.bridge.posted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect__other_identity__resets_round_and_reloads() {
    // given
    let mut ctx = awaiting_reveal(house()).await;
    let reads_before = ctx.reader.status_reads();

    // when
    ctx.send(json!({
        "type": "connect",
        "address": "dym1other",
        "hexAddress": "0x00000000000000000000000000000000000000bb",
    }))
    .await
    .unwrap();
    let snap = ctx
        .wait_for(|s| s.identity.address == "dym1other" && !s.status_loading)
        .await
        .unwrap();
    tokio::time::sleep(REVEAL * 2).await;

    // then
    assert_eq!(snap.phase, RoundPhase::Idle);
    assert_eq!(snap.pending_bet, None);
    assert_eq!(ctx.reader.status_reads(), reads_before + 1);
    assert_eq!(
        ctx.reader.addresses().last().map(String::as_str),
        Some("0x00000000000000000000000000000000000000bb")
    );
    assert_eq!(ctx.bridge.posted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect__pending_record_on_chain__recovers_round_without_auto_reveal() {
    // given
    let reader = house();
    reader.set_record(PlayerRecord {
        status: RecordStatus::Pending,
        won: false,
        player_choice: CoinSide::Dym,
        bet_amount: amount("2.5"),
    });
    let mut ctx = TestClient::spawn(reader, REVEAL);

    // when
    let snap = ctx.connect().await.unwrap();
    tokio::time::sleep(REVEAL * 2).await;

    // then
    assert_eq!(snap.phase, RoundPhase::AwaitingReveal);
    assert_eq!(
        snap.pending_bet,
        Some(PendingBet {
            amount: "2.5".to_string(),
            coin_side: CoinSide::Dym,
        })
    );
    assert_eq!(snap.coin_side, CoinSide::Dym);
    assert_eq!(snap.bet_input.as_deref(), Some("2.5"));
    assert!(snap.can_reveal);
    assert!(ctx.bridge.posted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn connect__some_reads_fail__single_notice_and_partial_status() {
    // given
    let reader = house();
    reader.fail_min_bet(true);
    reader.fail_record(true);
    let mut ctx = TestClient::spawn(reader, REVEAL);

    // when
    let snap = ctx.connect().await.unwrap();

    // then
    assert_eq!(snap.status.min_bet, None);
    assert_eq!(snap.status.max_bet, Some(amount("50")));
    assert_eq!(snap.status.reward_balance, Some(Amount::ZERO));
    assert_eq!(ctx.sink.messages(), vec![LOAD_FAILED.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn balances__wallet_reports_amount__updates_native_balance() {
    let mut ctx = TestClient::spawn(house(), REVEAL);
    ctx.connect().await.unwrap();

    ctx.send(json!({
        "type": "balances",
        "balances": [{ "amount": "2500000000000000000", "denom": "adym" }],
    }))
    .await
    .unwrap();
    let snap = ctx
        .wait_for(|s| s.native_balance.is_some())
        .await
        .unwrap();

    assert_eq!(snap.native_balance, Some(amount("2.5")));
}

#[tokio::test(start_paused = true)]
async fn shutdown__stops_client_task() {
    let mut ctx = TestClient::spawn(house(), REVEAL);
    ctx.connect().await.unwrap();
    ctx.stop().await.unwrap();
}
