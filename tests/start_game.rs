#![allow(non_snake_case)]
use coinflip_client::{
    SubmitError,
    abi::{
        AbiEncoder,
        CallEncoder,
    },
    amount::Amount,
    machine::{
        Command,
        Rejected,
    },
    model::{
        BroadcastTag,
        CoinSide,
        PendingBet,
        RoundPhase,
    },
    notify::DELIVERY_FAILED,
    test_helpers::{
        FakeReader,
        TEST_CONTRACT,
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
    reader.set_reward_balance(amount("1.5"));
    reader
}

#[tokio::test(start_paused = true)]
async fn connect__loads_house_status() {
    // given
    let mut ctx = TestClient::spawn(house(), REVEAL);

    // when
    let snap = ctx.connect().await.unwrap();

    // then
    assert_eq!(snap.status.min_bet, Some(amount("0.1")));
    assert_eq!(snap.status.max_bet, Some(amount("50")));
    assert_eq!(snap.status.reward_balance, Some(amount("1.5")));
    assert_eq!(ctx.reader.record_reads(), 1);
    assert!(ctx.sink.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn start_game__delivered__posts_one_start_message_and_awaits_reveal() {
    // given
    let mut ctx = TestClient::spawn(house(), REVEAL);
    ctx.connect().await.unwrap();
    ctx.handle
        .submit(Command::SetBet(Some("10".to_string())))
        .await
        .unwrap();
    ctx.handle
        .submit(Command::SetCoinSide(CoinSide::Dym))
        .await
        .unwrap();

    // when
    ctx.handle.submit(Command::StartGame).await.unwrap();
    let committing = ctx.handle.snapshot();
    ctx.tx_delivered().await.unwrap();
    let snap = ctx
        .wait_for(|s| s.phase == RoundPhase::AwaitingReveal && !s.status_loading)
        .await
        .unwrap();

    // then
    assert_eq!(committing.phase, RoundPhase::Committing);
    assert_eq!(committing.broadcasting, Some(BroadcastTag::StartGame));
    assert!(committing.flipping);
    let posted = ctx.bridge.posted();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].target_address, TEST_CONTRACT);
    assert_eq!(posted[0].encoded_data, AbiEncoder.start_game(CoinSide::Dym));
    assert_eq!(posted[0].value.as_deref(), Some("10000000000000000000"));
    assert_eq!(
        snap.pending_bet,
        Some(PendingBet {
            amount: "10".to_string(),
            coin_side: CoinSide::Dym,
        })
    );
    assert!(snap.can_reveal);
    assert_eq!(ctx.reader.status_reads(), 2);
    assert_eq!(ctx.reader.record_reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn start_game__while_broadcasting__is_rejected() {
    // given
    let mut ctx = TestClient::spawn(house(), REVEAL);
    ctx.connect().await.unwrap();
    ctx.handle
        .submit(Command::SetBet(Some("1".to_string())))
        .await
        .unwrap();
    ctx.handle.submit(Command::StartGame).await.unwrap();

    // when
    let second = ctx.handle.submit(Command::StartGame).await;
    let reveal = ctx.handle.submit(Command::CompleteGame).await;

    // then
    assert!(matches!(
        second,
        Err(SubmitError::Rejected(Rejected::MessageOutstanding))
    ));
    assert!(matches!(
        reveal,
        Err(SubmitError::Rejected(Rejected::MessageOutstanding))
    ));
    assert_eq!(ctx.bridge.posted().len(), 1);
    assert!(ctx.sink.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn start_game__not_connected__is_rejected_silently() {
    let ctx = TestClient::spawn(house(), REVEAL);
    ctx.handle
        .submit(Command::SetBet(Some("1".to_string())))
        .await
        .unwrap();

    let result = ctx.handle.submit(Command::StartGame).await;

    assert!(matches!(
        result,
        Err(SubmitError::Rejected(Rejected::NotConnected))
    ));
    assert!(ctx.bridge.posted().is_empty());
    assert!(ctx.sink.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn start_game__delivery_failed__notifies_once_and_allows_new_bet() {
    // given
    let mut ctx = TestClient::spawn(house(), REVEAL);
    ctx.connect().await.unwrap();
    ctx.handle
        .submit(Command::SetBet(Some("1".to_string())))
        .await
        .unwrap();
    ctx.handle.submit(Command::StartGame).await.unwrap();

    // when
    ctx.tx_failed(11).await.unwrap();
    let snap = ctx
        .wait_for(|s| s.phase == RoundPhase::Idle && !s.message_outstanding)
        .await
        .unwrap();

    // then
    assert_eq!(snap.pending_bet, None);
    assert!(!snap.flipping);
    assert_eq!(ctx.sink.messages(), vec![DELIVERY_FAILED.to_string()]);
    ctx.handle.submit(Command::StartGame).await.unwrap();
    assert_eq!(ctx.bridge.posted().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn start_game__bridge_unavailable__rolls_back_like_failed_delivery() {
    // given
    let mut ctx = TestClient::spawn(house(), REVEAL);
    ctx.connect().await.unwrap();
    ctx.bridge.fail_posts(true);
    ctx.handle
        .submit(Command::SetBet(Some("1".to_string())))
        .await
        .unwrap();

    // when
    ctx.handle.submit(Command::StartGame).await.unwrap();

    // then
    let snap = ctx.handle.snapshot();
    assert_eq!(snap.phase, RoundPhase::Idle);
    assert!(!snap.message_outstanding);
    assert_eq!(ctx.sink.messages(), vec![DELIVERY_FAILED.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn bridge_events__untrusted_origin__are_ignored() {
    // given
    let mut ctx = TestClient::spawn(house(), REVEAL);

    // when
    ctx.send_from(
        "http://evil.example",
        json!({ "type": "connect", "address": "dym1evil", "hexAddress": "0xevil" }),
    )
    .await
    .unwrap();
    ctx.send(json!({ "type": "ready" })).await.unwrap();
    let snap = ctx.wait_for(|s| s.bridge_ready).await.unwrap();

    // then
    assert!(!snap.identity.is_connected());
    assert_eq!(ctx.reader.status_reads(), 0);
}

#[tokio::test(start_paused = true)]
async fn tx_response__without_broadcast__is_ignored() {
    // given
    let mut ctx = TestClient::spawn(house(), REVEAL);
    ctx.connect().await.unwrap();

    // when
    ctx.tx_failed(3).await.unwrap();
    ctx.send(json!({ "type": "menu-visible", "value": true }))
        .await
        .unwrap();
    let snap = ctx.wait_for(|s| s.menu_visible).await.unwrap();

    // then
    assert_eq!(snap.phase, RoundPhase::Idle);
    assert!(ctx.sink.notifications().is_empty());
}
