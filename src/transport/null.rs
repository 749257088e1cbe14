//! No-op transport for running without hardware attached.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::servo::{Servo, ServoPositions};

use super::{ServoTransport, TransportError, move_command, stop_command};

/// Logs every command instead of sending it anywhere.
#[derive(Debug, Default)]
pub struct NullTransport;

impl NullTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ServoTransport for NullTransport {
    async fn move_to(
        &self,
        positions: &ServoPositions,
        move_time_ms: Option<u32>,
    ) -> Result<(), TransportError> {
        tracing::debug!(command = move_command(positions, move_time_ms).trim_end(), "null TX");
        Ok(())
    }

    async fn stop_servos(&self, servos: &BTreeSet<Servo>) -> Result<(), TransportError> {
        tracing::debug!(command = stop_command(servos).trim_end(), "null TX");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        tracing::debug!("null transport stopped");
        Ok(())
    }
}
