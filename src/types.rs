//! Enumerated status types shared between the boards.
//!
//! These travel as 4-byte little-endian discriminants and show up in the
//! console and the persistence store by display name. Name lookup ignores
//! case; unknown names and out-of-range discriminants are rejected rather
//! than mapped to a fallback, so a corrupted frame never lands as a
//! plausible state.

use core::fmt;
use core::str::FromStr;

use crate::element::{Element, ElementType};

/// Error returned when a name or discriminant matches no variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub type_tag: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a valid {}", self.value, self.type_tag)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident : $kind:ident, default = $default:ident {
            $( $variant:ident = $value:literal => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $( $variant = $value ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Display name.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            pub fn from_u32(value: u32) -> Option<Self> {
                match value {
                    $( $value => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| UnknownVariant {
                        type_tag: ElementType::$kind.tag(),
                        value: s.to_string(),
                    })
            }
        }

        impl Element for $name {
            const ELEMENT_TYPE: ElementType = ElementType::$kind;

            fn write_bytes(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&(*self as u32).to_le_bytes());
            }

            fn read_bytes(bytes: &[u8]) -> Option<Self> {
                bytes
                    .try_into()
                    .ok()
                    .map(u32::from_le_bytes)
                    .and_then($name::from_u32)
            }

            fn to_canonical(&self) -> String {
                self.as_str().to_string()
            }

            fn parse_canonical(text: &str) -> Option<Self> {
                text.parse().ok()
            }
        }
    };
}

wire_enum! {
    /// Audio source feeding the sound processor.
    pub enum SoundInputSource: SoundInputSource, default = Off {
        Off = 0 => "OFF",
        Microphone = 1 => "Microphone",
        Bluetooth = 2 => "Bluetooth",
    }
}

wire_enum! {
    /// Where processed audio is forwarded.
    pub enum SoundOutputSource: SoundOutputSource, default = Off {
        Off = 0 => "OFF",
        Bluetooth = 1 => "Bluetooth",
    }
}

wire_enum! {
    /// Bluetooth device discovery state.
    pub enum BluetoothDiscoveryMode: BluetoothDiscoveryMode, default = Unknown {
        Started = 0 => "Discovery Mode Started",
        Stopped = 1 => "Discovery Mode Stopped",
        Unknown = 2 => "Discovery Mode Unknown",
    }
}

wire_enum! {
    /// Bluetooth source/sink connection state.
    pub enum ConnectionStatus: ConnectionStatus, default = Disconnected {
        Disconnected = 0 => "Disconnected",
        Connecting = 1 => "Connecting",
        Connected = 2 => "Connected",
        Disconnecting = 3 => "Disconnecting",
        Unknown = 4 => "Unknown",
    }
}

wire_enum! {
    /// Quantized sound level published by the audio board.
    pub enum SoundState: SoundState, default = LastingSilenceDetected {
        LastingSilenceDetected = 0 => "Lasting Silence Detected",
        SilenceDetected = 1 => "Silence Detected",
        SoundLevel1Detected = 2 => "Sound Level 1 Detected",
        SoundLevel2Detected = 3 => "Sound Level 2 Detected",
        SoundLevel3Detected = 4 => "Sound Level 3 Detected",
        SoundLevel4Detected = 5 => "Sound Level 4 Detected",
        SoundLevel5Detected = 6 => "Sound Level 5 Detected",
        SoundLevel6Detected = 7 => "Sound Level 6 Detected",
        SoundLevel7Detected = 8 => "Sound Level 7 Detected",
        SoundLevel8Detected = 9 => "Sound Level 8 Detected",
        SoundLevel9Detected = 10 => "Sound Level 9 Detected",
        SoundLevel10Detected = 11 => "Sound Level 10 Detected",
        SoundLevel11Detected = 12 => "Sound Level 11 Detected",
    }
}
