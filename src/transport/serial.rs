//! Native serial ports via `tokio-serial`.

use tokio_serial::SerialPortBuilderExt;

use super::link::{BoxFuture, Link, LinkConnector};
use crate::config::{FlowControl, Parity, SerialSettings};
use crate::error::{PfodError, Result};

/// Opens the configured serial port.
#[derive(Debug, Clone)]
pub struct SerialPortConnector {
    settings: SerialSettings,
}

impl SerialPortConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    fn data_bits(&self) -> Result<tokio_serial::DataBits> {
        Ok(match self.settings.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            8 => tokio_serial::DataBits::Eight,
            other => {
                return Err(PfodError::InvalidConfig(format!(
                    "data_bits must be 5..=8, got {}",
                    other
                )))
            }
        })
    }

    fn stop_bits(&self) -> Result<tokio_serial::StopBits> {
        match self.settings.stop_bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(PfodError::InvalidConfig(format!(
                "stop_bits must be 1 or 2, got {}",
                other
            ))),
        }
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.settings.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }

    fn flow_control(&self) -> tokio_serial::FlowControl {
        match self.settings.flow_control {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

impl LinkConnector for SerialPortConnector {
    fn open(&self) -> BoxFuture<'_, Result<Link>> {
        Box::pin(async move {
            let path = self.settings.port.clone().ok_or_else(|| {
                PfodError::LinkSelection("No serial port selected".into())
            })?;

            let stream = tokio_serial::new(&path, self.settings.baud_rate)
                .data_bits(self.data_bits()?)
                .stop_bits(self.stop_bits()?)
                .parity(self.parity())
                .flow_control(self.flow_control())
                .open_native_async()
                .map_err(|e| {
                    PfodError::LinkSelection(format!(
                        "Could not open serial port {}: {}. Check that it exists and is not in use",
                        path, e
                    ))
                })?;

            tracing::info!(
                port = %path,
                baud_rate = self.settings.baud_rate,
                "Serial port opened"
            );
            Ok(Link::from_stream(path, stream))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_frame_settings_rejected() {
        let connector = SerialPortConnector::new(SerialSettings {
            data_bits: 9,
            stop_bits: 3,
            ..SerialSettings::default()
        });
        assert!(matches!(connector.data_bits(), Err(PfodError::InvalidConfig(_))));
        assert!(matches!(connector.stop_bits(), Err(PfodError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_missing_device_is_selection_error() {
        let connector = SerialPortConnector::new(SerialSettings {
            port: Some("/dev/pfod-link-does-not-exist".into()),
            ..SerialSettings::default()
        });
        let err = connector.open().await.unwrap_err();
        assert!(matches!(err, PfodError::LinkSelection(_)));
    }
}
