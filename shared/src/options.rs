use crate::block::{Block, BLOCKS};
use crate::cell::Special;
use crate::{FIELD_HEIGHT, FIELD_SIZE};
use serde::{Deserialize, Serialize};

/// Length of both frequency tables.
pub const FREQUENCY_TABLE_LEN: usize = 100;

/// Rules of one game, broadcast in `newgame` and never changed afterwards.
///
/// The frequency tables hold one entry per percent: a block or special is
/// drawn by picking a uniformly random entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameOptions {
    pub starting_height: u32,
    pub starting_level: u32,
    pub lines_per_level: u32,
    pub level_increment: u32,
    pub lines_per_special: u32,
    pub specials_added: u32,
    pub special_capacity: u32,
    pub block_frequencies: Vec<Block>,
    pub special_frequencies: Vec<Special>,
    pub display_average_levels: bool,
    pub classic_mode: bool,
}

impl Default for GameOptions {
    fn default() -> Self {
        GameOptions {
            starting_height: 0,
            starting_level: 1,
            lines_per_level: 2,
            level_increment: 1,
            lines_per_special: 1,
            specials_added: 1,
            special_capacity: 18,
            block_frequencies: default_block_frequencies(),
            special_frequencies: default_special_frequencies(),
            display_average_levels: true,
            classic_mode: false,
        }
    }
}

fn expand<T: Copy>(counts: &[(T, usize)]) -> Vec<T> {
    counts
        .iter()
        .flat_map(|(item, n)| std::iter::repeat(*item).take(*n))
        .collect()
}

fn default_block_frequencies() -> Vec<Block> {
    let counts: Vec<(Block, usize)> = BLOCKS
        .iter()
        .enumerate()
        .map(|(i, b)| (*b, if i < 5 { 14 } else { 15 }))
        .collect();
    expand(&counts)
}

fn default_special_frequencies() -> Vec<Special> {
    expand(&[
        (Special::AddLine, 32),
        (Special::ClearLine, 18),
        (Special::NukeField, 1),
        (Special::RandomBlocksClear, 11),
        (Special::SwitchFields, 3),
        (Special::ClearSpecialBlocks, 14),
        (Special::Gravity, 1),
        (Special::QuakeField, 6),
        (Special::BlockBomb, 14),
    ])
}

impl GameOptions {
    /// Checks the constraints a `newgame` line must satisfy.
    pub fn is_valid(&self) -> bool {
        self.starting_level > 0
            && self.starting_height as usize <= FIELD_HEIGHT
            && self.specials_added as usize <= FIELD_SIZE
            && self.lines_per_level > 0
            && self.lines_per_special > 0
            && self.block_frequencies.len() == FREQUENCY_TABLE_LEN
            && self.block_frequencies.iter().all(|b| *b != Block::Nothing)
            && (self.classic_mode
                || (self.special_frequencies.len() == FREQUENCY_TABLE_LEN
                    && self
                        .special_frequencies
                        .iter()
                        .all(|s| s.frequency_digit().is_some())))
    }

    /// Specials only exist outside classic mode.
    pub fn specials_enabled(&self) -> bool {
        !self.classic_mode && !self.special_frequencies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = GameOptions::default();
        assert_eq!(options.block_frequencies.len(), 100);
        assert_eq!(options.special_frequencies.len(), 100);
        assert!(options.is_valid());
        assert!(options.specials_enabled());
    }

    #[test]
    fn test_zero_rates_are_invalid() {
        let mut options = GameOptions::default();
        options.lines_per_level = 0;
        assert!(!options.is_valid());

        let mut options = GameOptions::default();
        options.starting_level = 0;
        assert!(!options.is_valid());
    }

    #[test]
    fn test_amounts_beyond_the_field_are_invalid() {
        let mut options = GameOptions::default();
        options.starting_height = FIELD_HEIGHT as u32;
        options.specials_added = FIELD_SIZE as u32;
        assert!(options.is_valid());

        options.starting_height = u32::MAX;
        assert!(!options.is_valid());

        let mut options = GameOptions::default();
        options.specials_added = FIELD_SIZE as u32 + 1;
        assert!(!options.is_valid());
    }

    #[test]
    fn test_classic_mode_ignores_special_table() {
        let options = GameOptions {
            classic_mode: true,
            special_frequencies: Vec::new(),
            ..GameOptions::default()
        };
        assert!(options.is_valid());
        assert!(!options.specials_enabled());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: GameOptions =
            serde_json::from_str(r#"{"starting_height": 4, "classic_mode": true}"#).unwrap();
        assert_eq!(options.starting_height, 4);
        assert!(options.classic_mode);
        assert_eq!(options.special_capacity, 18);
        assert_eq!(options.block_frequencies.len(), 100);
    }
}
