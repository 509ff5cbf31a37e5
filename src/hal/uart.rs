//! UART stream for the inter-board link.
//!
//! # Hardware Setup
//!
//! ```text
//! this board TX (GPIO17) ──────▶ peer RX
//! this board RX (GPIO16) ◀────── peer TX
//!                 GND    ─────── GND
//! ```
//!
//! The driver is split so the RX and TX tasks of the transport manager each
//! own one half.

use std::io;

use esp_idf_svc::hal::delay::NON_BLOCK;
use esp_idf_svc::hal::gpio::{AnyIOPin, InputPin, OutputPin};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::{self, Uart, UartDriver, UartRxDriver, UartTxDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::EspError;
use tracing::info;

use crate::config::UartConfig;
use crate::link::{LinkReader, LinkWriter};

/// Receive half of the link UART.
pub struct UartLinkReader<'d> {
    rx: UartRxDriver<'d>,
}

/// Transmit half of the link UART.
pub struct UartLinkWriter<'d> {
    tx: UartTxDriver<'d>,
}

fn to_io(e: EspError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// Initialize a UART for the link and split it into reader and writer.
pub fn init_uart_link<'d, U: Uart>(
    uart: impl Peripheral<P = U> + 'd,
    tx_pin: impl Peripheral<P = impl OutputPin> + 'd,
    rx_pin: impl Peripheral<P = impl InputPin> + 'd,
    config: &UartConfig,
) -> Result<(UartLinkReader<'d>, UartLinkWriter<'d>), EspError> {
    let uart_config = uart::config::Config::default().baudrate(Hertz(config.baud_rate));

    let driver = UartDriver::new(
        uart,
        tx_pin,
        rx_pin,
        Option::<AnyIOPin>::None, // CTS
        Option::<AnyIOPin>::None, // RTS
        &uart_config,
    )?;
    let (tx, rx) = driver.into_split();

    info!(
        baud = config.baud_rate,
        tx_pin = config.tx_pin,
        rx_pin = config.rx_pin,
        "link UART ready"
    );
    Ok((UartLinkReader { rx }, UartLinkWriter { tx }))
}

impl LinkReader for UartLinkReader<'_> {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.rx.read(buf, NON_BLOCK).map_err(to_io)
    }
}

impl LinkWriter for UartLinkWriter<'_> {
    fn write_all(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        while !bytes.is_empty() {
            let n = self.tx.write(bytes).map_err(to_io)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "UART accepted no bytes"));
            }
            bytes = &bytes[n..];
        }
        Ok(())
    }
}
