use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::{rng, Rng};
use serde::{Deserialize, Serialize};

use super::{Sender, TransportError};
use crate::codec::{JsonCodec, Serializer, XmlCodec};
use crate::context::DispatchContext;

/// Length of the reference ids a simulated gateway hands out.
const REF_ID_LEN: usize = 20;

/// Encoding of the fabricated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedFormat {
    Json,
    Xml,
}

#[derive(Debug, Serialize)]
#[serde(rename = "Response")]
struct SimulatedReply {
    ref_id: String,
    status: &'static str,
    created_at: DateTime<Utc>,
}

/// Stand-in for a real gateway: ignores the payload and accepts every transaction as
/// `pending` under a fresh random reference id.
#[derive(Debug, Clone)]
pub struct SimulatedSender {
    format: SimulatedFormat,
    latency: Duration,
}

impl SimulatedSender {
    pub fn new(format: SimulatedFormat) -> Self {
        Self { format, latency: Duration::ZERO }
    }

    /// Delay every reply; the delay is cut short if the context ends.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn reply(&self) -> Result<Vec<u8>, TransportError> {
        let reply = SimulatedReply {
            ref_id: random_ref_id(),
            status: "pending",
            created_at: Utc::now(),
        };
        let encoded = match self.format {
            SimulatedFormat::Json => Serializer::<_, serde_json::Value>::serialize(&JsonCodec, &reply),
            SimulatedFormat::Xml => Serializer::<_, serde_json::Value>::serialize(&XmlCodec, &reply),
        };
        encoded.map_err(|e| TransportError::Simulation(e.to_string()))
    }
}

fn random_ref_id() -> String {
    rng().sample_iter(&Alphanumeric).take(REF_ID_LEN).map(char::from).collect()
}

#[async_trait]
impl Sender for SimulatedSender {
    async fn send(&self, ctx: &DispatchContext, _payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        if !self.latency.is_zero() {
            ctx.run(tokio::time::sleep(self.latency)).await.map_err(TransportError::Cancelled)?;
        } else if let Some(reason) = ctx.err() {
            return Err(TransportError::Cancelled(reason));
        }
        self.reply()
    }
}
