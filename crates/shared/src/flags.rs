//! Bitflag universes shared with the controller plugin and the orchestrator.
//!
//! Bit values are part of the wire contract and are spelled out per flag;
//! they never depend on declaration order.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {universe} flag '{flag}'")]
pub struct UnknownFlag {
    pub universe: &'static str,
    pub flag: String,
}

impl UnknownFlag {
    fn new(universe: &'static str, flag: impl Into<String>) -> Self {
        Self {
            universe,
            flag: flag.into(),
        }
    }
}

/// A fixed table of named single-bit flags.
///
/// `decode` is a membership test per table entry and ignores bits outside
/// the table. The `encode_*` helpers are strict and reject anything that is
/// not a table entry.
pub trait FlagUniverse: Copy + Ord + 'static {
    const UNIVERSE: &'static str;
    const ALL: &'static [Self];

    fn bit(self) -> u32;
    fn name(self) -> &'static str;

    fn from_bit(bit: u32) -> Result<Self, UnknownFlag> {
        Self::ALL
            .iter()
            .copied()
            .find(|flag| flag.bit() == bit)
            .ok_or_else(|| UnknownFlag::new(Self::UNIVERSE, bit.to_string()))
    }

    fn from_name(name: &str) -> Result<Self, UnknownFlag> {
        Self::ALL
            .iter()
            .copied()
            .find(|flag| flag.name() == name)
            .ok_or_else(|| UnknownFlag::new(Self::UNIVERSE, name))
    }

    /// Flags present in `mask`, in ascending bit order.
    fn decode(mask: u32) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|flag| mask & flag.bit() != 0)
            .collect()
    }

    /// Present flags mapped to `true`; absent flags are omitted.
    fn decode_map(mask: u32) -> BTreeMap<Self, bool> {
        Self::decode(mask).into_iter().map(|flag| (flag, true)).collect()
    }

    fn encode<I>(flags: I) -> u32
    where
        I: IntoIterator<Item = Self>,
    {
        flags.into_iter().fold(0, |mask, flag| mask | flag.bit())
    }

    fn encode_names<I, S>(names: I) -> Result<u32, UnknownFlag>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(0, |mask, name| {
            Ok(mask | Self::from_name(name.as_ref())?.bit())
        })
    }

    fn encode_bits<I>(bits: I) -> Result<u32, UnknownFlag>
    where
        I: IntoIterator<Item = u32>,
    {
        bits.into_iter()
            .try_fold(0, |mask, bit| Ok(mask | Self::from_bit(bit)?.bit()))
    }

    fn defined_mask() -> u32 {
        Self::encode(Self::ALL.iter().copied())
    }

    /// Drops every bit that is not a table entry.
    fn normalize(mask: u32) -> u32 {
        mask & Self::defined_mask()
    }
}

macro_rules! flag_universe {
    (
        $(#[$meta:meta])*
        $name:ident, $universe:literal {
            $($variant:ident = $bit:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl FlagUniverse for $name {
            const UNIVERSE: &'static str = $universe;
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn bit(self) -> u32 {
                match self {
                    $(Self::$variant => $bit),+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::from_name(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

flag_universe! {
    /// Hot-cue kinds reported by the controller.
    HotcueType, "hot-cue type" {
        HotCue = 1 => "Hot_Cue",
        SavedLoop = 2 => "Saved_Loop",
        Action = 4 => "Action",
        RemixPoint = 8 => "Remix_Point",
        BeatGridAnchor = 16 => "BeatGrid_Anchor",
        AutomixPoint = 32 => "Automix_Point",
        LoadPoint = 64 => "Load_Point",
    }
}

flag_universe! {
    CueColor, "cue color" {
        Invisible = 0x1 => "Invisible",
        DarkGrey = 0x2 => "DarkGrey",
        LightGrey = 0x4 => "LightGrey",
        White = 0x8 => "White",
        Burgundy = 0x10 => "Burgundy",
        Apricot = 0x20 => "Apricot",
        Red = 0x40 => "Red",
        Orange = 0x80 => "Orange",
        Yellow = 0x100 => "Yellow",
        Eggshell = 0x200 => "Eggshell",
        Green = 0x400 => "Green",
        Cyan = 0x800 => "Cyan",
        Cobalt = 0x1000 => "Cobalt",
        Blue = 0x2000 => "Blue",
        Purple = 0x4000 => "Purple",
        Magenta = 0x8000 => "Magenta",
    }
}

impl CueColor {
    /// "Any color". A mask value, not a flag of its own.
    pub const ALL_MASK: u32 = 0xFFFF;
}

flag_universe! {
    /// Decks are named by their bit value, matching the orchestrator's keys.
    Deck, "deck" {
        Deck1 = 1 => "1",
        Deck2 = 2 => "2",
        Deck3 = 4 => "4",
        Deck4 = 8 => "8",
    }
}

/// One entry of an explicit flag list: either the flag's name or its bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagRef {
    Bit(u32),
    Name(String),
}

/// A mask as accepted on the wire: a raw integer or a list of flags.
///
/// Raw integers follow decode semantics (undefined bits are dropped); flag
/// lists follow encode semantics (undefined flags are rejected).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskInput {
    Mask(u32),
    Flags(Vec<FlagRef>),
}

impl MaskInput {
    pub fn resolve<F: FlagUniverse>(&self) -> Result<u32, UnknownFlag> {
        match self {
            Self::Mask(mask) => Ok(F::normalize(*mask)),
            Self::Flags(flags) => flags.iter().try_fold(0, |mask, flag| {
                let flag = match flag {
                    FlagRef::Bit(bit) => F::from_bit(*bit)?,
                    FlagRef::Name(name) => F::from_name(name)?,
                };
                Ok(mask | flag.bit())
            }),
        }
    }
}

impl Default for MaskInput {
    fn default() -> Self {
        Self::Mask(0)
    }
}

impl From<u32> for MaskInput {
    fn from(mask: u32) -> Self {
        Self::Mask(mask)
    }
}

#[cfg(test)]
#[path = "tests/flags_tests.rs"]
mod tests;
