//! Wire element types.
//!
//! Every synchronized value is a fixed-length array of one element type.
//! An element knows its wire tag, its byte width, how to lay itself out in
//! memory order (little-endian, as stored on the ESP32) and its canonical
//! string form. The canonical string is what the validity checker, the
//! console and the persistence store see.
//!
//! # Canonical forms
//!
//! ```text
//! Bool_t      "1" / "0"       (parse also accepts true/false/on/off)
//! Int*/Uint*  decimal
//! Float/Double shortest round-trip decimal
//! Char_t      the whole array as text, up to the first NUL
//! enums       display name, parsed case-insensitively
//! ```
//!
//! Arrays of non-`Char_t` elements join their canonical forms with `|`.

use core::fmt;

/// Separator between elements of an array in canonical string form.
pub const ELEMENT_DIVIDER: char = '|';

/// Closed set of element types understood on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Bool,
    Int8,
    Int16,
    Int32,
    Uint8,
    Uint16,
    Uint32,
    Char,
    Float,
    Double,
    SoundState,
    ConnectionStatus,
    SoundInputSource,
    SoundOutputSource,
    BluetoothDiscoveryMode,
}

impl ElementType {
    /// All element types, in wire-tag order.
    pub const ALL: [ElementType; 15] = [
        ElementType::Bool,
        ElementType::Int8,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Uint8,
        ElementType::Uint16,
        ElementType::Uint32,
        ElementType::Char,
        ElementType::Float,
        ElementType::Double,
        ElementType::SoundState,
        ElementType::ConnectionStatus,
        ElementType::SoundInputSource,
        ElementType::SoundOutputSource,
        ElementType::BluetoothDiscoveryMode,
    ];

    /// Type tag carried in the `T` field.
    pub const fn tag(self) -> &'static str {
        match self {
            ElementType::Bool => "Bool_t",
            ElementType::Int8 => "Int8_t",
            ElementType::Int16 => "Int16_t",
            ElementType::Int32 => "Int32_t",
            ElementType::Uint8 => "Uint8_t",
            ElementType::Uint16 => "Uint16_t",
            ElementType::Uint32 => "Uint32_t",
            ElementType::Char => "Char_t",
            ElementType::Float => "Float_t",
            ElementType::Double => "Double_t",
            ElementType::SoundState => "SoundState_t",
            ElementType::ConnectionStatus => "ConnectionStatus_t",
            ElementType::SoundInputSource => "SoundInputSource_t",
            ElementType::SoundOutputSource => "SoundOutputSource_t",
            ElementType::BluetoothDiscoveryMode => "Bluetooth_Discovery_Mode_t",
        }
    }

    /// Width of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementType::Bool
            | ElementType::Int8
            | ElementType::Uint8
            | ElementType::Char => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32
            | ElementType::Uint32
            | ElementType::Float
            | ElementType::SoundState
            | ElementType::ConnectionStatus
            | ElementType::SoundInputSource
            | ElementType::SoundOutputSource
            | ElementType::BluetoothDiscoveryMode => 4,
            ElementType::Double => 8,
        }
    }

    /// Look up a type by its wire tag (exact match).
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.tag() == tag)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A value that can travel as one element of a synchronized array.
pub trait Element: Copy + PartialEq + Default + Send + Sync + fmt::Debug + 'static {
    const ELEMENT_TYPE: ElementType;
    const SIZE: usize = Self::ELEMENT_TYPE.size();

    /// Append the in-memory bytes of this element to `out`.
    fn write_bytes(&self, out: &mut Vec<u8>);

    /// Rebuild an element from exactly [`Self::SIZE`] bytes.
    fn read_bytes(bytes: &[u8]) -> Option<Self>;

    fn to_canonical(&self) -> String;

    fn parse_canonical(text: &str) -> Option<Self>;

    /// Canonical string of a whole array.
    fn format_values(values: &[Self]) -> String {
        let mut out = String::new();
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                out.push(ELEMENT_DIVIDER);
            }
            out.push_str(&v.to_canonical());
        }
        out
    }

    /// Parse a whole array; the text must hold exactly `count` elements.
    fn parse_values(text: &str, count: usize) -> Option<Vec<Self>> {
        let values = text
            .split(ELEMENT_DIVIDER)
            .map(|part| Self::parse_canonical(part.trim()))
            .collect::<Option<Vec<_>>>()?;
        (values.len() == count).then_some(values)
    }

    /// Strings handed to the validity checker, one per independently
    /// checked unit.
    fn validation_units(values: &[Self]) -> Vec<String> {
        values.iter().map(Element::to_canonical).collect()
    }
}

/// Raw bytes of an array, element by element.
pub fn to_bytes<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::SIZE);
    for v in values {
        v.write_bytes(&mut out);
    }
    out
}

/// Rebuild an array from raw bytes. `None` if the length is not a whole
/// number of elements or any element is out of its domain.
pub fn from_bytes<T: Element>(bytes: &[u8]) -> Option<Vec<T>> {
    if bytes.len() % T::SIZE != 0 {
        return None;
    }
    bytes.chunks_exact(T::SIZE).map(T::read_bytes).collect()
}

macro_rules! integer_element {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl Element for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$kind;

            fn write_bytes(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_bytes(bytes: &[u8]) -> Option<Self> {
                bytes.try_into().ok().map(<$ty>::from_le_bytes)
            }

            fn to_canonical(&self) -> String {
                self.to_string()
            }

            fn parse_canonical(text: &str) -> Option<Self> {
                text.trim().parse().ok()
            }
        }
    )*};
}

integer_element! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
}

macro_rules! float_element {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl Element for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$kind;

            fn write_bytes(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_bytes(bytes: &[u8]) -> Option<Self> {
                bytes
                    .try_into()
                    .ok()
                    .map(<$ty>::from_le_bytes)
                    .filter(|v| v.is_finite())
            }

            fn to_canonical(&self) -> String {
                self.to_string()
            }

            // NaN never compares equal, so it would count as a change on
            // every write.
            fn parse_canonical(text: &str) -> Option<Self> {
                text.trim().parse::<$ty>().ok().filter(|v| v.is_finite())
            }
        }
    )*};
}

float_element! {
    f32 => Float,
    f64 => Double,
}

impl Element for bool {
    const ELEMENT_TYPE: ElementType = ElementType::Bool;

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn read_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0] => Some(false),
            [1] => Some(true),
            _ => None,
        }
    }

    fn to_canonical(&self) -> String {
        String::from(if *self { "1" } else { "0" })
    }

    fn parse_canonical(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" => Some(true),
            "0" | "false" | "off" => Some(false),
            _ => None,
        }
    }
}

/// One byte of a fixed-length text item.
///
/// A `[Char; N]` array is treated as a NUL-padded string: it formats,
/// parses and validates as a single unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct Char(pub u8);

impl Char {
    /// Fill a fixed array from text, NUL-padding the tail.
    ///
    /// Returns `None` if the text does not fit.
    pub fn array_from_str<const N: usize>(text: &str) -> Option<[Char; N]> {
        let bytes = text.as_bytes();
        if bytes.len() > N {
            return None;
        }
        let mut out = [Char(0); N];
        for (slot, b) in out.iter_mut().zip(bytes) {
            *slot = Char(*b);
        }
        Some(out)
    }

    /// Text up to the first NUL.
    pub fn slice_to_string(chars: &[Char]) -> String {
        let bytes: Vec<u8> = chars.iter().map(|c| c.0).take_while(|b| *b != 0).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Element for Char {
    const ELEMENT_TYPE: ElementType = ElementType::Char;

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.0);
    }

    fn read_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b] => Some(Char(*b)),
            _ => None,
        }
    }

    fn to_canonical(&self) -> String {
        Char::slice_to_string(core::slice::from_ref(self))
    }

    fn parse_canonical(text: &str) -> Option<Self> {
        match text.as_bytes() {
            [] => Some(Char(0)),
            [b] => Some(Char(*b)),
            _ => None,
        }
    }

    fn format_values(values: &[Self]) -> String {
        Char::slice_to_string(values)
    }

    fn parse_values(text: &str, count: usize) -> Option<Vec<Self>> {
        let bytes = text.as_bytes();
        if bytes.len() > count {
            return None;
        }
        let mut out: Vec<Char> = bytes.iter().map(|b| Char(*b)).collect();
        out.resize(count, Char(0));
        Some(out)
    }

    fn validation_units(values: &[Self]) -> Vec<String> {
        vec![Char::slice_to_string(values)]
    }
}
