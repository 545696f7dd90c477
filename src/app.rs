use crate::ui;
use coinflip_client::{
    abi::AbiEncoder,
    client::{
        GameClient,
        GameHandle,
        SubmitError,
    },
    config::ClientConfig,
    machine::{
        Command,
        GameMachine,
        MachineConfig,
    },
    notify::{
        ChannelSink,
        MessagePicker,
        Notification,
        TracingSink,
    },
    sim::{
        SimHouse,
        SimWallet,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    time,
};
use tracing::{
    debug,
    info,
};

const INBOUND_BUFFER: usize = 64;

pub async fn run_app(config: ClientConfig) -> Result<()> {
    let house = SimHouse::new(&config.sim).wrap_err("invalid sim configuration")?;
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
    let wallet = SimWallet::new(house.clone(), &config.sim, config.origin(), inbound_tx)
        .wrap_err("invalid sim wallet configuration")?;
    let (channel_sink, notifications) = ChannelSink::new();

    let machine = GameMachine::new(
        MachineConfig {
            contract_address: config.contract_address.clone(),
            reveal_delay: config.reveal_delay(),
        },
        AbiEncoder,
        MessagePicker::from_entropy(),
    );
    let (client, handle) = GameClient::new(
        machine,
        house,
        wallet.clone(),
        (TracingSink, channel_sink),
        config.origin(),
        inbound_rx,
    );
    let client_task = tokio::spawn(client.run());
    wallet.announce_ready().await?;

    let mut ui_state = ui::UiState::new(config.connect_frame_url());
    ui::terminal_enter(&mut ui_state)?;
    let mut input_events = ui::spawn_input_thread();
    let res = run_loop(
        handle.clone(),
        &wallet,
        notifications,
        &mut ui_state,
        &mut input_events,
    )
    .await;
    ui::terminal_exit()?;

    handle.shutdown().await;
    client_task.await.wrap_err("game client task failed")??;
    res
}

async fn run_loop(
    mut handle: GameHandle,
    wallet: &SimWallet,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    info!("running app loop");
    let mut ticker = time::interval(Duration::from_millis(200));
    let mut snapshot = handle.snapshot();
    ui::draw(ui_state, &snapshot)?;
    loop {
        let animating = snapshot.flipping || snapshot.status_loading;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => { break; }
            changed = handle.changed() => {
                snapshot = changed.wrap_err("game client stopped")?;
                ui::draw(ui_state, &snapshot)?;
            }
            Some(notification) = notifications.recv() => {
                ui_state.push_notification(notification);
                ui::draw(ui_state, &snapshot)?;
            }
            _ = ticker.tick(), if animating => {
                ui_state.advance_spinner();
                ui::draw(ui_state, &snapshot)?;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                let result = match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::BetChanged(draft) => {
                        let bet = (!draft.is_empty()).then_some(draft);
                        handle.submit(Command::SetBet(bet)).await
                    }
                    ui::UserEvent::ToggleSide => handle.submit(Command::ToggleCoinSide).await,
                    ui::UserEvent::Flip => handle.submit(Command::StartGame).await,
                    ui::UserEvent::Reveal => handle.submit(Command::CompleteGame).await,
                    ui::UserEvent::RetryOutcome => handle.submit(Command::RetryOutcome).await,
                    ui::UserEvent::Connect => {
                        wallet.connect().await?;
                        Ok(())
                    }
                    ui::UserEvent::Disconnect => {
                        wallet.disconnect().await?;
                        Ok(())
                    }
                };
                settle_submit(result)?;
                snapshot = handle.snapshot();
                ui::draw(ui_state, &snapshot)?;
            }
        }
    }
    Ok(())
}

/// A rejected command is a silent no-op for the player; only a stopped
/// client ends the loop.
fn settle_submit(result: Result<(), SubmitError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(SubmitError::Rejected(reason)) => {
            debug!(%reason, "command not accepted");
            Ok(())
        }
        Err(SubmitError::Closed) => Err(eyre!("game client stopped")),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use coinflip_client::machine::Rejected;

    #[test]
    fn settle_submit__rejected__is_silently_ignored() {
        // given
        let rejected = Err(SubmitError::Rejected(Rejected::MessageOutstanding));

        // when
        let settled = settle_submit(rejected);

        // then
        assert!(settled.is_ok());
    }

    #[test]
    fn settle_submit__client_stopped__ends_loop() {
        assert!(settle_submit(Err(SubmitError::Closed)).is_err());
        assert!(settle_submit(Ok(())).is_ok());
    }
}
