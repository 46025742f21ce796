//! Cell states and special items.
//!
//! Each variant maps to one character in the full-field encoding, one in the
//! partial-field encoding, and (for specials) one code letter in `sb`
//! messages. All tables live here so parser and builder cannot drift apart.

use serde::{Deserialize, Serialize};

/// Content of a single field cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Nothing,
    Blue,
    Yellow,
    Green,
    Purple,
    Red,
    AddLine,
    ClearLine,
    ClearSpecialBlocks,
    RandomBlocksClear,
    BlockBomb,
    QuakeField,
    Gravity,
    SwitchFields,
    NukeField,
    Immunity,
    ClearColumn,
    MutatePieces,
    Darkness,
    Confusion,
    LeftGravity,
    PieceChange,
    ZebraField,
}

/// The plain colours, in wire order.
pub const COLORS: [Cell; 5] = [Cell::Blue, Cell::Yellow, Cell::Green, Cell::Purple, Cell::Red];

impl Cell {
    pub fn is_empty(self) -> bool {
        self == Cell::Nothing
    }

    pub fn is_color(self) -> bool {
        COLORS.contains(&self)
    }

    /// Special item carried by this cell, if any.
    pub fn special(self) -> Option<Special> {
        let special = match self {
            Cell::AddLine => Special::AddLine,
            Cell::ClearLine => Special::ClearLine,
            Cell::ClearSpecialBlocks => Special::ClearSpecialBlocks,
            Cell::RandomBlocksClear => Special::RandomBlocksClear,
            Cell::BlockBomb => Special::BlockBomb,
            Cell::QuakeField => Special::QuakeField,
            Cell::Gravity => Special::Gravity,
            Cell::SwitchFields => Special::SwitchFields,
            Cell::NukeField => Special::NukeField,
            Cell::Immunity => Special::Immunity,
            Cell::ClearColumn => Special::ClearColumn,
            Cell::MutatePieces => Special::MutatePieces,
            Cell::Darkness => Special::Darkness,
            Cell::Confusion => Special::Confusion,
            Cell::LeftGravity => Special::LeftGravity,
            Cell::PieceChange => Special::PieceChange,
            Cell::ZebraField => Special::ZebraField,
            _ => return None,
        };
        Some(special)
    }

    /// Character used in a full field update.
    ///
    /// Cells without a wire representation are sent as empty.
    pub fn full_update_char(self) -> char {
        match self {
            Cell::Nothing => '0',
            Cell::Blue => '1',
            Cell::Yellow => '2',
            Cell::Green => '3',
            Cell::Purple => '4',
            Cell::Red => '5',
            Cell::AddLine => 'a',
            Cell::ClearLine => 'c',
            Cell::NukeField => 'n',
            Cell::RandomBlocksClear => 'r',
            Cell::SwitchFields => 's',
            Cell::ClearSpecialBlocks => 'b',
            Cell::Gravity => 'g',
            Cell::QuakeField => 'q',
            Cell::BlockBomb => 'o',
            _ => '0',
        }
    }

    pub fn from_full_update_char(c: char) -> Option<Cell> {
        let cell = match c {
            '0' => Cell::Nothing,
            '1' => Cell::Blue,
            '2' => Cell::Yellow,
            '3' => Cell::Green,
            '4' => Cell::Purple,
            '5' => Cell::Red,
            'a' => Cell::AddLine,
            'c' => Cell::ClearLine,
            'n' => Cell::NukeField,
            'r' => Cell::RandomBlocksClear,
            's' => Cell::SwitchFields,
            'b' => Cell::ClearSpecialBlocks,
            'g' => Cell::Gravity,
            'q' => Cell::QuakeField,
            'o' => Cell::BlockBomb,
            _ => return None,
        };
        Some(cell)
    }

    /// Character used in a partial field update.
    pub fn partial_update_char(self) -> char {
        match self {
            Cell::Nothing => '!',
            Cell::Blue => '"',
            Cell::Yellow => '#',
            Cell::Green => '$',
            Cell::Purple => '%',
            Cell::Red => '&',
            Cell::AddLine => '\'',
            Cell::ClearLine => '(',
            Cell::NukeField => ')',
            Cell::RandomBlocksClear => '*',
            Cell::SwitchFields => '+',
            Cell::ClearSpecialBlocks => ',',
            Cell::Gravity => '-',
            Cell::QuakeField => '.',
            Cell::BlockBomb => '/',
            _ => '!',
        }
    }

    pub fn from_partial_update_char(c: char) -> Option<Cell> {
        let cell = match c {
            '!' => Cell::Nothing,
            '"' => Cell::Blue,
            '#' => Cell::Yellow,
            '$' => Cell::Green,
            '%' => Cell::Purple,
            '&' => Cell::Red,
            '\'' => Cell::AddLine,
            '(' => Cell::ClearLine,
            ')' => Cell::NukeField,
            '*' => Cell::RandomBlocksClear,
            '+' => Cell::SwitchFields,
            ',' => Cell::ClearSpecialBlocks,
            '-' => Cell::Gravity,
            '.' => Cell::QuakeField,
            '/' => Cell::BlockBomb,
            _ => return None,
        };
        Some(cell)
    }
}

/// Attack or defence item a player can hold and use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Special {
    #[default]
    Nothing,
    AddLine,
    ClearLine,
    NukeField,
    RandomBlocksClear,
    SwitchFields,
    ClearSpecialBlocks,
    Gravity,
    QuakeField,
    BlockBomb,
    // TetriNET2 only
    Immunity,
    ClearColumn,
    MutatePieces,
    Darkness,
    Confusion,
    // Blocktrix only
    LeftGravity,
    PieceChange,
    ZebraField,
}

/// Specials selectable through a `newgame` frequency digit (1-9).
const FREQUENCY_SPECIALS: [Special; 9] = [
    Special::AddLine,
    Special::ClearLine,
    Special::NukeField,
    Special::RandomBlocksClear,
    Special::SwitchFields,
    Special::ClearSpecialBlocks,
    Special::Gravity,
    Special::QuakeField,
    Special::BlockBomb,
];

impl Special {
    /// Letter used in `sb` messages.
    pub fn code(self) -> Option<char> {
        let c = match self {
            Special::AddLine => 'a',
            Special::ClearLine => 'c',
            Special::NukeField => 'n',
            Special::RandomBlocksClear => 'r',
            Special::SwitchFields => 's',
            Special::ClearSpecialBlocks => 'b',
            Special::Gravity => 'g',
            Special::QuakeField => 'q',
            Special::BlockBomb => 'o',
            Special::LeftGravity => 'l',
            Special::PieceChange => 'p',
            Special::ZebraField => 'z',
            _ => return None,
        };
        Some(c)
    }

    pub fn from_code(code: &str) -> Option<Special> {
        let special = match code {
            "a" => Special::AddLine,
            "c" => Special::ClearLine,
            "n" => Special::NukeField,
            "r" => Special::RandomBlocksClear,
            "s" => Special::SwitchFields,
            "b" => Special::ClearSpecialBlocks,
            "g" => Special::Gravity,
            "q" => Special::QuakeField,
            "o" => Special::BlockBomb,
            "l" => Special::LeftGravity,
            "p" => Special::PieceChange,
            "z" => Special::ZebraField,
            _ => return None,
        };
        Some(special)
    }

    pub fn from_frequency_digit(digit: u32) -> Option<Special> {
        match digit {
            1..=9 => Some(FREQUENCY_SPECIALS[digit as usize - 1]),
            _ => None,
        }
    }

    pub fn frequency_digit(self) -> Option<u32> {
        FREQUENCY_SPECIALS
            .iter()
            .position(|s| *s == self)
            .map(|i| i as u32 + 1)
    }

    /// Field cell representing this special.
    pub fn cell(self) -> Cell {
        match self {
            Special::Nothing => Cell::Nothing,
            Special::AddLine => Cell::AddLine,
            Special::ClearLine => Cell::ClearLine,
            Special::NukeField => Cell::NukeField,
            Special::RandomBlocksClear => Cell::RandomBlocksClear,
            Special::SwitchFields => Cell::SwitchFields,
            Special::ClearSpecialBlocks => Cell::ClearSpecialBlocks,
            Special::Gravity => Cell::Gravity,
            Special::QuakeField => Cell::QuakeField,
            Special::BlockBomb => Cell::BlockBomb,
            Special::Immunity => Cell::Immunity,
            Special::ClearColumn => Cell::ClearColumn,
            Special::MutatePieces => Cell::MutatePieces,
            Special::Darkness => Cell::Darkness,
            Special::Confusion => Cell::Confusion,
            Special::LeftGravity => Cell::LeftGravity,
            Special::PieceChange => Cell::PieceChange,
            Special::ZebraField => Cell::ZebraField,
        }
    }
}
