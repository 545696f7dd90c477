use coinflip_client::{
    machine::GameSnapshot,
    model::{
        BroadcastTag,
        Outcome,
        RoundPhase,
    },
    notify::{
        Level,
        Notification,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::{
    collections::VecDeque,
    io::stdout,
};
use tokio::sync::mpsc;

const MAX_NOTIFICATIONS: usize = 6;
const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub type InputEventReceiver = mpsc::UnboundedReceiver<Event>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    BetChanged(String),
    ToggleSide,
    Flip,
    Reveal,
    RetryOutcome,
    Connect,
    Disconnect,
}

#[derive(Default)]
pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    frame_url: String,
    bet_draft: String,
    notifications: VecDeque<Notification>,
    spinner: usize,
}

impl UiState {
    pub fn new(frame_url: impl Into<String>) -> Self {
        Self {
            frame_url: frame_url.into(),
            ..Self::default()
        }
    }

    pub fn push_notification(&mut self, notification: Notification) {
        self.notifications.push_front(notification);
        self.notifications.truncate(MAX_NOTIFICATIONS);
    }

    pub fn advance_spinner(&mut self) {
        self.spinner = (self.spinner + 1) % SPINNER.len();
    }

    fn spinner(&self) -> &'static str {
        SPINNER[self.spinner]
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Reads terminal input on a dedicated thread; `event::read` blocks.
pub fn spawn_input_thread() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(?err, "reading terminal input failed");
                    break;
                }
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    input_events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input closed"))
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let Event::Key(KeyEvent {
        code,
        modifiers,
        kind,
        ..
    }) = event
    else {
        return None;
    };
    if kind != KeyEventKind::Press {
        return None;
    }
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(UserEvent::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Some(UserEvent::Quit),
        KeyCode::Char(ch) if ch.is_ascii_digit() || (ch == '.' && !state.bet_draft.contains('.')) => {
            state.bet_draft.push(ch);
            Some(UserEvent::BetChanged(state.bet_draft.clone()))
        }
        KeyCode::Backspace => {
            state.bet_draft.pop();
            Some(UserEvent::BetChanged(state.bet_draft.clone()))
        }
        KeyCode::Char('s') => Some(UserEvent::ToggleSide),
        KeyCode::Enter => Some(UserEvent::Flip),
        KeyCode::Char('r') => Some(UserEvent::Reveal),
        KeyCode::Char('o') => Some(UserEvent::RetryOutcome),
        KeyCode::Char('c') => Some(UserEvent::Connect),
        KeyCode::Char('d') => Some(UserEvent::Disconnect),
        _ => None,
    }
}

pub fn draw(state: &mut UiState, snap: &GameSnapshot) -> Result<()> {
    // the client may rewrite the bet (recovered rounds)
    state.bet_draft = snap.bet_input.clone().unwrap_or_default();
    if let Some(mut term) = state.terminal.take() {
        let res = term.draw(|f| ui(f, state, snap)).map(|_| ());
        state.terminal = Some(term);
        res?;
    }
    Ok(())
}

fn ui(f: &mut Frame, state: &UiState, snap: &GameSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // wallet
            Constraint::Length(8), // house + round
            Constraint::Min(4),    // notifications
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_wallet(f, chunks[0], state, snap);
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[1]);
    draw_house(f, middle[0], state, snap);
    draw_round(f, middle[1], state, snap);
    draw_notifications(f, chunks[2], state);
    draw_help(f, chunks[3]);
}

fn draw_wallet(f: &mut Frame, area: Rect, state: &UiState, snap: &GameSnapshot) {
    let mut lines = Vec::new();
    if snap.identity.is_connected() {
        let balance = snap
            .native_balance
            .map(|b| format!("{} DYM", b.to_decimal_string()))
            .unwrap_or_else(|| "-".to_string());
        lines.push(Line::from(format!(
            "{} ({}) | Balance: {}",
            snap.identity.short_chain_address(),
            snap.identity.address,
            balance
        )));
    } else {
        lines.push(Line::styled(
            "Not connected (press c)",
            Style::default().fg(Color::DarkGray),
        ));
    }
    let bridge = if snap.bridge_ready { "ready" } else { "loading" };
    let menu = if snap.menu_visible { " | menu open" } else { "" };
    lines.push(Line::styled(
        format!("Wallet frame {bridge}{menu} | {}", state.frame_url),
        Style::default().fg(Color::DarkGray),
    ));
    let wallet = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(wallet, area);
}

fn draw_house(f: &mut Frame, area: Rect, state: &UiState, snap: &GameSnapshot) {
    let lines = match snap.status.reward_balance {
        None if snap.identity.is_connected() => {
            vec![Line::from(format!("{} loading", state.spinner()))]
        }
        None => vec![Line::styled("-", Style::default().fg(Color::DarkGray))],
        Some(rewards) => {
            let fmt = |amount: Option<coinflip_client::amount::Amount>| {
                format!("{} DYM", amount.unwrap_or_default().to_decimal_string())
            };
            vec![
                Line::from(format!("Min Bet  {}", fmt(snap.status.min_bet))),
                Line::from(format!("Max Bet  {}", fmt(snap.status.max_bet))),
                Line::from(format!("Rewards  {}", fmt(Some(rewards)))),
            ]
        }
    };
    let house =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("House"));
    f.render_widget(house, area);
}

fn draw_round(f: &mut Frame, area: Rect, state: &UiState, snap: &GameSnapshot) {
    let mut lines = Vec::new();
    let phase = if snap.flipping {
        format!("{} {}", snap.phase, state.spinner())
    } else {
        snap.phase.to_string()
    };
    lines.push(Line::from(format!("Phase: {phase}")));

    let bet = match &snap.pending_bet {
        Some(pending) => format!("{} DYM on {} (locked)", pending.amount, pending.coin_side),
        None => {
            let draft = if state.bet_draft.is_empty() { "_" } else { state.bet_draft.as_str() };
            format!("{draft} DYM on {}", snap.coin_side)
        }
    };
    lines.push(Line::from(format!("Bet: {bet}")));

    if let Some(tag) = snap.broadcasting {
        let label = match tag {
            BroadcastTag::StartGame => "Confirm the bet in your wallet",
            BroadcastTag::CompleteGame => "Confirm the reveal in your wallet",
        };
        lines.push(Line::styled(label, Style::default().fg(Color::Yellow)));
    }
    if snap.can_reveal {
        lines.push(Line::styled(
            "Ready to reveal (press r)",
            Style::default().fg(Color::Cyan),
        ));
    }
    if snap.phase == RoundPhase::Settled {
        lines.push(Line::from("Reading the result..."));
    }
    if snap.outcome_unresolved {
        lines.push(Line::styled(
            "Result unavailable (press o to retry)",
            Style::default().fg(Color::Red),
        ));
    }
    match snap.last_outcome {
        Some(Outcome::Won) => lines.push(Line::styled(
            "Last flip: won",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Some(Outcome::Lost) => {
            lines.push(Line::styled("Last flip: lost", Style::default().fg(Color::Red)))
        }
        None => {}
    }
    let round = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Coin Flip"));
    f.render_widget(round, area);
}

fn draw_notifications(f: &mut Frame, area: Rect, state: &UiState) {
    let lines: Vec<Line> = if state.notifications.is_empty() {
        vec![Line::styled("Nothing yet", Style::default().fg(Color::DarkGray))]
    } else {
        state
            .notifications
            .iter()
            .map(|n| {
                let color = match n.level {
                    Level::Success => Color::Green,
                    Level::Error => Color::Red,
                };
                Line::styled(
                    format!("{} {}", n.at.format("%H:%M:%S"), n.message),
                    Style::default().fg(color),
                )
            })
            .collect()
    };
    let notes = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Notifications"));
    f.render_widget(notes, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let text = Line::from(
        "0-9 . bet | s side | Enter flip | r reveal | o retry result | c connect | d disconnect | q/Esc quit",
    );
    let help = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}
