//! Closed selector enumerations used to look up generator inputs.
//!
//! Every enum parses from its lowercase key and fails with
//! `INPUT.UNKNOWN_CATEGORY` for anything else, so a typo in a config file or
//! on the command line never reaches the path builder.

use crate::domain::SimbatchError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

macro_rules! selector_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $key:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn key(self) -> &'static str {
                match self {
                    $(Self::$variant => $key),+
                }
            }

            pub fn keys() -> Vec<&'static str> {
                Self::ALL.iter().map(|value| value.key()).collect()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.key())
            }
        }

        impl FromStr for $name {
            type Err = SimbatchError;

            fn from_str(token: &str) -> Result<Self, Self::Err> {
                match token.trim() {
                    $($key => Ok(Self::$variant),)+
                    other => Err(SimbatchError::unknown_category($kind, other, &Self::keys())),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.key())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let token = String::deserialize(deserializer)?;
                token.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

selector_enum! {
    /// Signal particle (or background-only selector) of a production.
    Particle, "particle" {
        OmegaEpem => "omegaepem",
        OmegaDalitz => "omegadalitz",
        Phi => "phi",
        InMed => "inmed",
        Qgp => "qgp",
        Rho0 => "rho0",
        Urqmd => "urqmd",
    }
}

selector_enum! {
    CollisionSystem, "collision system" {
        AuAu => "auau",
        AgAg => "agag",
        NiNi => "nini",
    }
}

selector_enum! {
    CollisionEnergy, "collision energy" {
        Gev3_5 => "3.5gev",
        Gev4_5 => "4.5gev",
        Gev8 => "8gev",
        Gev10 => "10gev",
        Gev12 => "12gev",
    }
}

selector_enum! {
    /// On-disk naming generation of the generator input store.
    InputConvention, "input convention" {
        Legacy => "legacy",
        New => "new",
    }
}

impl Particle {
    /// Whether the particle has its own generator file next to the background.
    pub const fn has_signal_input(self) -> bool {
        !matches!(self, Self::Urqmd)
    }
}

impl InputConvention {
    pub const fn index_width(self) -> usize {
        match self {
            Self::Legacy => 4,
            Self::New => 5,
        }
    }
}
