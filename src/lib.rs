//! # LightTower link
//!
//! Cross-board state synchronization for the LightTower controller.
//!
//! ## Architecture
//!
//! Boards share named, typed variables ([`SyncItem`]) over point-to-point
//! UART links. Each link is driven by a [`TransportManager`] with its own RX
//! and TX tasks; items decide per policy when to transmit and which
//! direction commits into their current value.
//!
//! ```text
//! ValidityChecker ─┐
//!                  ├─▶ ValueCell ─▶ SyncItem ─▶ LinkHandle ─▶ TransportManager ─▶ UART
//! Codec ───────────┘                   │
//!                                      └─▶ PersistenceCache ─▶ NVS
//! ```

pub mod cell;
pub mod codec;
pub mod config;
pub mod console;
pub mod directory;
pub mod element;
pub mod error;
pub mod hal;
pub mod item;
pub mod line_buffer;
pub mod link;
pub mod logging;
pub mod persist;
pub mod stats;
pub mod timer;
pub mod types;
pub mod validity;

pub use cell::{is_newer, ValueCell, ValueObserver};
pub use codec::Message;
pub use config::{LinkConfig, PersistConfig, UartConfig, STRING_ITEM_LEN};
pub use directory::ItemDirectory;
pub use element::{Char, Element, ElementType};
pub use error::{BuildError, DecodeError, EncodeError, LinkError, PersistError};
pub use item::{DynItem, RxTxType, SyncItem, UpdateStatus, UpdateStoreType};
pub use link::{LinkHandle, LinkReader, LinkWriter, TransportManager};
pub use persist::{KeyValueStore, MemoryStore, PersistenceCache};
pub use stats::{LinkSnapshot, LinkStats};
pub use timer::TimerService;
pub use types::{BluetoothDiscoveryMode, ConnectionStatus, SoundInputSource, SoundOutputSource, SoundState};
pub use validity::{ComparatorType, ValidityChecker};
