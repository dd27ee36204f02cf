use std::str::FromStr;

use thiserror::Error;

/// A named allow-list constraining which tools the engine may expose to
/// the LLM in a given context (spec §4.3, glossary "Preset").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Safe,
    ReadOnly,
    Full,
}

#[derive(Debug, Error)]
#[error("unknown tool preset: {0}")]
pub struct UnknownPreset(pub String);

impl FromStr for Preset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(Preset::Safe),
            "read-only" | "read_only" => Ok(Preset::ReadOnly),
            "full" => Ok(Preset::Full),
            other => Err(UnknownPreset(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_presets() {
        assert_eq!("safe".parse::<Preset>().unwrap(), Preset::Safe);
        assert_eq!("read-only".parse::<Preset>().unwrap(), Preset::ReadOnly);
        assert_eq!("full".parse::<Preset>().unwrap(), Preset::Full);
    }

    #[test]
    fn unknown_preset_is_a_hard_error() {
        assert!("bogus".parse::<Preset>().is_err());
    }
}
