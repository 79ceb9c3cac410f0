//! Serial port link built on `tokio-serial`.

use meterlink_core::{Error, Parity, Result, SerialSettings};
use tokio::io::AsyncReadExt;
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, SerialPort, SerialPortBuilder, SerialPortBuilderExt,
    SerialStream, StopBits,
};
use tracing::{debug, info};

use crate::Link;

/// Receive-only serial link, typically an optical IR head on a meter.
///
/// The input queue is cleared on every open so that bytes buffered by
/// the driver before the session started never reach the framer.
pub struct SerialLink {
    settings: SerialSettings,
    port: Option<SerialStream>,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("settings", &self.settings)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialLink {
    #[must_use]
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings, port: None }
    }

    #[must_use]
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn builder(&self) -> Result<SerialPortBuilder> {
        Ok(tokio_serial::new(&self.settings.port, self.settings.baud_rate)
            .data_bits(data_bits(self.settings.data_bits)?)
            .stop_bits(stop_bits(self.settings.stop_bits)?)
            .parity(parity(self.settings.parity))
            .flow_control(FlowControl::None))
    }
}

impl Link for SerialLink {
    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        if self.settings.port.is_empty() {
            return Err(Error::Config("No serial port configured".to_string()));
        }

        let port = self.builder()?.open_native_async().map_err(|e| {
            Error::connection(format!("Failed to open {}: {e}", self.settings.port))
        })?;
        port.clear(ClearBuffer::Input)
            .map_err(|e| Error::connection(format!("Failed to flush {}: {e}", self.settings.port)))?;

        info!(link = %self.describe(), "Serial port open");
        self.port = Some(port);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // SerialStream has no explicit close; dropping releases the device
        if self.port.take().is_some() {
            debug!(port = %self.settings.port, "Serial port closed");
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::connection(format!("{} is not open", self.settings.port)))?;
        port.read(buf)
            .await
            .map_err(|e| Error::connection(format!("Read from {} failed: {e}", self.settings.port)))
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        let parity = match self.settings.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        format!(
            "{}@{} {}{}{}",
            self.settings.port,
            self.settings.baud_rate,
            self.settings.data_bits,
            parity,
            self.settings.stop_bits
        )
    }
}

fn data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(Error::Config(format!("Unsupported data bits: {other}"))),
    }
}

fn stop_bits(bits: u8) -> Result<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(Error::Config(format!("Unsupported stop bits: {other}"))),
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}
