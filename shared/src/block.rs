//! Block kinds, rotations and the cached shape table.

use crate::cell::Cell;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Block {
    #[default]
    Nothing,
    Line,
    Square,
    LeftL,
    RightL,
    RightZ,
    LeftZ,
    HalfCross,
}

/// Blocks that can actually fall, in frequency-digit order (1-7).
pub const BLOCKS: [Block; 7] = [
    Block::Line,
    Block::Square,
    Block::LeftL,
    Block::RightL,
    Block::RightZ,
    Block::LeftZ,
    Block::HalfCross,
];

impl Block {
    pub fn from_frequency_digit(digit: u32) -> Option<Block> {
        match digit {
            1..=7 => Some(BLOCKS[digit as usize - 1]),
            _ => None,
        }
    }

    pub fn frequency_digit(self) -> Option<u32> {
        BLOCKS.iter().position(|b| *b == self).map(|i| i as u32 + 1)
    }

    /// Colour the block leaves behind once it lands.
    pub fn color(self) -> Cell {
        match self {
            Block::Nothing => Cell::Nothing,
            Block::Line => Cell::Blue,
            Block::Square => Cell::Yellow,
            Block::LeftL => Cell::Green,
            Block::RightL => Cell::Purple,
            Block::RightZ => Cell::Red,
            Block::LeftZ => Cell::Blue,
            Block::HalfCross => Cell::Yellow,
        }
    }

    /// Cached shape for this block in the given orientation.
    ///
    /// Returns `None` for `Block::Nothing`.
    pub fn shape(self, rotation: BlockRotation) -> Option<&'static BlockShape> {
        let index = self.frequency_digit()? as usize - 1;
        Some(&shape_table()[index][rotation.index()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlockRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

const ROTATIONS: [BlockRotation; 4] = [
    BlockRotation::Deg0,
    BlockRotation::Deg90,
    BlockRotation::Deg180,
    BlockRotation::Deg270,
];

impl BlockRotation {
    pub fn index(self) -> usize {
        match self {
            BlockRotation::Deg0 => 0,
            BlockRotation::Deg90 => 1,
            BlockRotation::Deg180 => 2,
            BlockRotation::Deg270 => 3,
        }
    }

    /// Counter-clockwise quarter turn.
    pub fn turned_left(self) -> BlockRotation {
        ROTATIONS[(self.index() + 1) % 4]
    }

    /// Clockwise quarter turn.
    pub fn turned_right(self) -> BlockRotation {
        ROTATIONS[(self.index() + 3) % 4]
    }
}

/// Rectangular cell grid of one block orientation, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockShape {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl BlockShape {
    /// Builds a shape from text rows where `#` marks an occupied cell.
    pub fn from_rows(rows: &[&str], cell: Cell) -> Self {
        let height = rows.len();
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut cells = vec![Cell::Nothing; width * height];
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    cells[x + y * width] = cell;
                }
            }
        }
        BlockShape {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Cell {
        if x >= self.width || y >= self.height {
            return Cell::Nothing;
        }
        self.cells[x + y * self.width]
    }

    /// Occupied cells as `(x, y, cell)` relative to the top-left corner.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, usize, Cell)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(move |(i, c)| (i % self.width, i / self.width, *c))
    }

    /// Quarter turn: `(x, y)` moves to `(y, width - 1 - x)`.
    pub fn rotated_90(&self) -> BlockShape {
        let mut rotated = BlockShape {
            width: self.height,
            height: self.width,
            cells: vec![Cell::Nothing; self.cells.len()],
        };
        for (x, y, cell) in self.occupied() {
            rotated.cells[y + (self.width - 1 - x) * rotated.width] = cell;
        }
        rotated
    }

    pub fn rotated_180(&self) -> BlockShape {
        let mut rotated = BlockShape {
            width: self.width,
            height: self.height,
            cells: vec![Cell::Nothing; self.cells.len()],
        };
        for (x, y, cell) in self.occupied() {
            rotated.cells[(self.width - 1 - x) + (self.height - 1 - y) * self.width] = cell;
        }
        rotated
    }

    /// Inverse of [`BlockShape::rotated_90`]: `(x, y)` moves to `(height - 1 - y, x)`.
    pub fn rotated_270(&self) -> BlockShape {
        let mut rotated = BlockShape {
            width: self.height,
            height: self.width,
            cells: vec![Cell::Nothing; self.cells.len()],
        };
        for (x, y, cell) in self.occupied() {
            rotated.cells[(self.height - 1 - y) + x * rotated.width] = cell;
        }
        rotated
    }
}

static SHAPES: OnceLock<Vec<[BlockShape; 4]>> = OnceLock::new();

fn base_rows(block: Block) -> &'static [&'static str] {
    match block {
        Block::Line => &["....", "####", "....", "...."],
        Block::Square => &["##", "##"],
        Block::LeftL => &["#..", "###", "..."],
        Block::RightL => &["..#", "###", "..."],
        Block::RightZ => &["##.", ".##", "..."],
        Block::LeftZ => &[".##", "##.", "..."],
        Block::HalfCross => &[".#.", "###", "..."],
        Block::Nothing => &[],
    }
}

/// Builds every orientation of every block once; later calls are lookups.
pub fn shape_table() -> &'static [[BlockShape; 4]] {
    SHAPES.get_or_init(|| {
        BLOCKS
            .iter()
            .map(|block| {
                let base = BlockShape::from_rows(base_rows(*block), block.color());
                let quarter = base.rotated_90();
                let half = base.rotated_180();
                let three_quarters = base.rotated_270();
                [base, quarter, half, three_quarters]
            })
            .collect()
    })
}
