use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

pub const DEFAULT_CONNECT_URL: &str = "http://localhost:3002";
pub const DEFAULT_NETWORK_ID: &str = "dymflip_248217-1";
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const DEFAULT_REVEAL_DELAY_MS: u64 = 6_000;
pub const DEFAULT_LOG_DIR: &str = "~/.coinflip/logs";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub contract_address: String,
    /// Origin of the wallet frame; also the only origin trusted for events.
    pub connect_url: String,
    pub network_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_account: Option<String>,
    pub reveal_delay_ms: u64,
    pub log_dir: String,
    pub sim: SimConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_string(),
            connect_url: DEFAULT_CONNECT_URL.to_string(),
            network_ids: vec![DEFAULT_NETWORK_ID.to_string()],
            qr_account: None,
            reveal_delay_ms: DEFAULT_REVEAL_DELAY_MS,
            log_dir: DEFAULT_LOG_DIR.to_string(),
            sim: SimConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<str>) -> Result<Self> {
        let path = expand_path(path.as_ref());
        let data = fs::read(&path)
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_slice::<ClientConfig>(&data)
            .wrap_err_with(|| format!("Failed to parse config JSON {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.contract_address.is_empty() {
            return Err(eyre!("contract_address must not be empty"));
        }
        if !self.connect_url.starts_with("http://") && !self.connect_url.starts_with("https://")
        {
            return Err(eyre!(
                "connect_url must be an http(s) origin, got {}",
                self.connect_url
            ));
        }
        if self.network_ids.is_empty() {
            return Err(eyre!("network_ids must name at least one network"));
        }
        Ok(())
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn log_dir(&self) -> PathBuf {
        expand_path(&self.log_dir)
    }

    /// Trusted origin: the connect URL without any trailing slash.
    pub fn origin(&self) -> &str {
        self.connect_url.trim_end_matches('/')
    }

    /// Address the wallet frame is loaded from.
    pub fn connect_frame_url(&self) -> String {
        let account = self
            .qr_account
            .as_deref()
            .map(|account| format!("/account/{account}"))
            .unwrap_or_default();
        format!(
            "{}/connect{}?networkIds={}",
            self.origin(),
            account,
            self.network_ids.join(",")
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipMode {
    /// Outcomes drawn from the house's random source.
    #[default]
    Pseudo,
    /// Every flip resolves to the given result (`true` = the player wins).
    Fixed(bool),
}

/// Parameters of the in-process house and wallet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub player_address: String,
    pub player_hex_address: String,
    /// Decimal token amounts.
    pub wallet_balance: String,
    pub bankroll: String,
    pub min_bet: String,
    /// Max bet is the bankroll divided by this.
    pub max_bet_divisor: u32,
    pub latency_ms: u64,
    pub flip: FlipMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            player_address: "dym1qxk2c8yw6m2v3s5cn0lz4gy0xe8a4mdyv9xpyq".to_string(),
            player_hex_address: "0x30ac1c1c8ed36a8ca14d89ff8aa08fcd93b7b6d3".to_string(),
            wallet_balance: "100".to_string(),
            bankroll: "1000".to_string(),
            min_bet: "0.1".to_string(),
            max_bet_divisor: 20,
            latency_ms: 800,
            flip: FlipMode::Pseudo,
            seed: None,
        }
    }
}

impl SimConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    Path::new(expanded.as_ref()).to_path_buf()
}
