//! Hardware Abstraction Layer for the LightTower link.
//!
//! Thin wrappers around ESP-IDF peripherals.
//! Business logic stays in core modules, HAL is just I/O.

#[cfg(target_os = "espidf")]
pub mod uart;

#[cfg(target_os = "espidf")]
pub use uart::{init_uart_link, UartLinkReader, UartLinkWriter};
