use chrono::{
    DateTime,
    Utc,
};
use rand::{
    Rng,
    RngCore,
    SeedableRng,
    rngs::StdRng,
};
use tokio::sync::mpsc;
use tracing::{
    error,
    info,
};

pub const LOAD_FAILED: &str = "Can't load data, please try again later";
pub const DELIVERY_FAILED: &str = "Transaction delivery failed, please try again later";
pub const OUTCOME_UNAVAILABLE: &str = "Can't fetch game status, please try again later";

pub const SUCCESS_MESSAGES: [&str; 6] = [
    "You won! The coin landed your way.",
    "Winner! Your rewards are waiting.",
    "Nice call, the flip is yours.",
    "Luck is on your side today!",
    "Heads up, you just doubled your bet!",
    "Called it! Well played.",
];

pub const LOSING_MESSAGES: [&str; 6] = [
    "Not this time. Flip again?",
    "The coin had other plans.",
    "So close! Maybe try the other side.",
    "The house takes this one.",
    "Unlucky flip, better luck next round.",
    "Missed it by a side.",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Receives terminal outcome signals only; presentation is up to the sink.
pub trait NotificationSink: Send + 'static {
    fn notify(&self, notification: Notification);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Success => info!(message = %notification.message, "notification"),
            Level::Error => error!(message = %notification.message, "notification"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        // a closed receiver means the front-end is gone
        let _ = self.tx.send(notification);
    }
}

impl<A, B> NotificationSink for (A, B)
where
    A: NotificationSink,
    B: NotificationSink,
{
    fn notify(&self, notification: Notification) {
        self.0.notify(notification.clone());
        self.1.notify(notification);
    }
}

/// Uniform choice from the message pools over an injectable random source.
pub struct MessagePicker {
    rng: Box<dyn RngCore + Send>,
}

impl MessagePicker {
    pub fn new(rng: impl RngCore + Send + 'static) -> Self {
        Self { rng: Box::new(rng) }
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn success(&mut self) -> &'static str {
        self.pick(&SUCCESS_MESSAGES)
    }

    pub fn loss(&mut self) -> &'static str {
        self.pick(&LOSING_MESSAGES)
    }

    fn pick(&mut self, pool: &[&'static str]) -> &'static str {
        pool[self.rng.random_range(0..pool.len())]
    }
}

impl std::fmt::Debug for MessagePicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePicker").finish_non_exhaustive()
    }
}
