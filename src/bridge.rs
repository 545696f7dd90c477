use crate::model::OutgoingContractMessage;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::mpsc;
use tracing::{
    debug,
    warn,
};

/// A raw message from the wallet frame together with the origin it was
/// posted from.
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeEnvelope {
    pub origin: String,
    pub data: serde_json::Value,
}

impl BridgeEnvelope {
    pub fn new(origin: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeEvent {
    Ready,
    MenuVisible {
        #[serde(default)]
        value: bool,
    },
    Connect {
        #[serde(default)]
        address: String,
        #[serde(default, rename = "hexAddress")]
        hex_address: String,
    },
    Disconnect,
    Balances {
        #[serde(default)]
        balances: Vec<BalanceEntry>,
    },
    TxResponse(TxResponse),
    #[serde(other)]
    Unknown,
}

impl BridgeEvent {
    /// Decodes an envelope, dropping anything not posted by the trusted
    /// origin and anything that does not parse.
    pub fn from_envelope(envelope: &BridgeEnvelope, trusted_origin: &str) -> Option<Self> {
        if envelope.origin != trusted_origin {
            debug!(origin = %envelope.origin, "ignoring bridge message from untrusted origin");
            return None;
        }
        match serde_json::from_value::<BridgeEvent>(envelope.data.clone()) {
            Ok(BridgeEvent::Unknown) => {
                debug!(data = %envelope.data, "ignoring unknown bridge message");
                None
            }
            Ok(event) => Some(event),
            Err(err) => {
                warn!(%err, data = %envelope.data, "malformed bridge message");
                None
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    #[serde(default)]
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denom: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    #[serde(default, rename = "deliveryTxCode")]
    pub delivery_tx_code: Option<i64>,
}

/// Result of a transaction the wallet executed on our behalf. The code may
/// arrive nested under `response` or at the top level.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TxResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<TxReceipt>,
    #[serde(
        default,
        rename = "deliveryTxCode",
        skip_serializing_if = "Option::is_none"
    )]
    pub delivery_tx_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl TxResponse {
    pub fn delivered() -> Self {
        Self {
            response: Some(TxReceipt {
                delivery_tx_code: Some(0),
            }),
            ..Self::default()
        }
    }

    pub fn failed(code: i64, error: impl Into<String>) -> Self {
        Self {
            response: Some(TxReceipt {
                delivery_tx_code: Some(code),
            }),
            delivery_tx_code: None,
            error: Some(serde_json::Value::String(error.into())),
        }
    }

    pub fn delivery_code(&self) -> Option<i64> {
        self.response
            .as_ref()
            .and_then(|receipt| receipt.delivery_tx_code)
            .or(self.delivery_tx_code)
    }

    pub fn is_delivered(&self) -> bool {
        self.delivery_code() == Some(0) && self.error.is_none()
    }
}

/// Messages posted to the wallet frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingRequest {
    ExecuteEthTx { contract: OutgoingContractMessage },
}

/// Outgoing half of the wallet bridge. Results come back later as
/// [`BridgeEvent::TxResponse`] on the inbound channel.
pub trait MessageBridge: Send + 'static {
    fn post(&self, message: &OutgoingContractMessage) -> Result<()>;
}

/// Forwards serialised requests to whatever transport owns the wallet frame.
#[derive(Clone, Debug)]
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<serde_json::Value>,
}

impl ChannelBridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<serde_json::Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageBridge for ChannelBridge {
    fn post(&self, message: &OutgoingContractMessage) -> Result<()> {
        let request = OutgoingRequest::ExecuteEthTx {
            contract: message.clone(),
        };
        let wire = serde_json::to_value(&request)
            .wrap_err("failed to serialise outgoing bridge request")?;
        self.tx
            .send(wire)
            .map_err(|_| eyre!("bridge transport closed"))
    }
}
