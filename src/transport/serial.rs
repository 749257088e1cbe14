//! Serial transport for the servo controller board.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serial2_tokio::SerialPort;

use crate::servo::{Servo, ServoPositions};

use super::{ServoTransport, TransportError, move_command, stop_command};

pub struct SerialTransport {
    port: SerialPort,
    name: String,
}

impl SerialTransport {
    pub fn open(port_name: &str, baud: u32) -> Result<Self, TransportError> {
        tracing::info!(port = port_name, baud, "opening serial port");
        let port = SerialPort::open(port_name, baud)?;
        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }

    async fn send(&self, command: &str) -> Result<(), TransportError> {
        tracing::debug!(port = %self.name, command = command.trim_end(), "serial TX");
        self.port.write_all(command.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl ServoTransport for SerialTransport {
    async fn move_to(
        &self,
        positions: &ServoPositions,
        move_time_ms: Option<u32>,
    ) -> Result<(), TransportError> {
        self.send(&move_command(positions, move_time_ms)).await
    }

    async fn stop_servos(&self, servos: &BTreeSet<Servo>) -> Result<(), TransportError> {
        self.send(&stop_command(servos)).await
    }

    async fn stop(&self) -> Result<(), TransportError> {
        // Writes complete their syscall in write_all; dropping the port
        // closes it.
        tracing::info!(port = %self.name, "closing serial transport");
        Ok(())
    }
}
