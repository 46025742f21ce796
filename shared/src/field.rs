//! Player field: a 12x22 grid of cells plus the block currently falling.
//!
//! Cells are stored row-major at `x + y * FIELD_WIDTH`, `y = 0` being the
//! top row. The falling block is kept apart from the grid until it lands.

use crate::block::{Block, BlockRotation, BlockShape};
use crate::cell::{Cell, Special, COLORS};
use crate::{FIELD_HEIGHT, FIELD_SIZE, FIELD_WIDTH};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One cell of a partial field update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPosition {
    pub cell: Cell,
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallingBlock {
    pub block: Block,
    pub rotation: BlockRotation,
    pub x: i32,
    pub y: i32,
}

impl FallingBlock {
    /// Places `block` centred on the top row.
    pub fn spawn(block: Block) -> Self {
        let width = block
            .shape(BlockRotation::Deg0)
            .map(|s| s.width() as i32)
            .unwrap_or(0);
        FallingBlock {
            block,
            rotation: BlockRotation::Deg0,
            x: (FIELD_WIDTH as i32 - width) / 2,
            y: 0,
        }
    }

    pub fn shape(&self) -> Option<&'static BlockShape> {
        self.block.shape(self.rotation)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        FallingBlock {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    pub fn with_rotation(&self, rotation: BlockRotation) -> Self {
        FallingBlock { rotation, ..*self }
    }

    /// Occupied cells in field coordinates.
    pub fn cells(&self) -> Vec<(i32, i32, Cell)> {
        match self.shape() {
            Some(shape) => shape
                .occupied()
                .map(|(x, y, c)| (self.x + x as i32, self.y + y as i32, c))
                .collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    cells: [Cell; FIELD_SIZE],
    falling: Option<FallingBlock>,
}

impl Default for Field {
    fn default() -> Self {
        Self::new()
    }
}

impl Field {
    pub fn new() -> Self {
        Field {
            cells: [Cell::Nothing; FIELD_SIZE],
            falling: None,
        }
    }

    pub fn width(&self) -> usize {
        FIELD_WIDTH
    }

    pub fn height(&self) -> usize {
        FIELD_HEIGHT
    }

    fn index(x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= FIELD_WIDTH as i32 || y >= FIELD_HEIGHT as i32 {
            return None;
        }
        Some(x as usize + y as usize * FIELD_WIDTH)
    }

    /// Out-of-bounds reads yield `Cell::Nothing`.
    pub fn get_cell(&self, x: i32, y: i32) -> Cell {
        Self::index(x, y).map_or(Cell::Nothing, |i| self.cells[i])
    }

    pub fn set_cell(&mut self, cell: Cell, x: i32, y: i32) -> bool {
        match Self::index(x, y) {
            Some(i) => {
                self.cells[i] = cell;
                true
            }
            None => false,
        }
    }

    pub fn cells(&self) -> &[Cell; FIELD_SIZE] {
        &self.cells
    }

    /// Copies the grid into `dest`, optionally painting the falling block on top.
    pub fn copy_cells_to(&self, dest: &mut [Cell], with_falling: bool) -> bool {
        if dest.len() != FIELD_SIZE {
            return false;
        }
        dest.copy_from_slice(&self.cells);
        if with_falling {
            if let Some(falling) = &self.falling {
                for (x, y, cell) in falling.cells() {
                    if let Some(i) = Self::index(x, y) {
                        dest[i] = cell;
                    }
                }
            }
        }
        true
    }

    pub fn snapshot(&self, with_falling: bool) -> [Cell; FIELD_SIZE] {
        let mut cells = [Cell::Nothing; FIELD_SIZE];
        self.copy_cells_to(&mut cells, with_falling);
        cells
    }

    /// Replaces the whole grid; rejects input of the wrong size.
    pub fn update_cells(&mut self, cells: &[Cell]) -> bool {
        if cells.len() != FIELD_SIZE {
            return false;
        }
        self.cells.copy_from_slice(cells);
        true
    }

    /// Applies a partial update, all or nothing.
    pub fn apply_partial(&mut self, positions: &[CellPosition]) -> bool {
        if positions
            .iter()
            .any(|p| p.x >= FIELD_WIDTH || p.y >= FIELD_HEIGHT)
        {
            return false;
        }
        for p in positions {
            self.cells[p.x + p.y * FIELD_WIDTH] = p.cell;
        }
        true
    }

    pub fn clear(&mut self) {
        self.cells = [Cell::Nothing; FIELD_SIZE];
        self.falling = None;
    }

    pub fn falling_block(&self) -> Option<&FallingBlock> {
        self.falling.as_ref()
    }

    pub fn set_falling_block(&mut self, falling: Option<FallingBlock>) {
        self.falling = falling;
    }

    /// True when every occupied cell of `falling` is inside the field and empty.
    pub fn fits(&self, falling: &FallingBlock) -> bool {
        falling.cells().iter().all(|(x, y, _)| {
            Self::index(*x, *y).is_some_and(|i| self.cells[i].is_empty())
        })
    }

    /// Writes the falling block into the grid and forgets it.
    ///
    /// Only in-bounds empty cells are written, so a block that failed to
    /// spawn overlays the free part of the stack.
    pub fn merge_falling(&mut self) -> bool {
        let Some(falling) = self.falling.take() else {
            return false;
        };
        for (x, y, cell) in falling.cells() {
            if let Some(i) = Self::index(x, y) {
                if self.cells[i].is_empty() {
                    self.cells[i] = cell;
                }
            }
        }
        true
    }

    fn row(&self, y: usize) -> &[Cell] {
        &self.cells[y * FIELD_WIDTH..(y + 1) * FIELD_WIDTH]
    }

    fn remove_row(&mut self, y: usize) {
        self.cells.copy_within(0..y * FIELD_WIDTH, FIELD_WIDTH);
        self.cells[..FIELD_WIDTH].fill(Cell::Nothing);
    }

    /// Removes complete rows and returns how many went, plus the specials
    /// found on them (top to bottom, left to right).
    pub fn clear_full_lines(&mut self) -> (u32, Vec<Special>) {
        let mut cleared = 0;
        let mut specials = Vec::new();
        let mut y = FIELD_HEIGHT;
        while y > 0 {
            let row = y - 1;
            if self.row(row).iter().all(|c| !c.is_empty()) {
                specials.extend(self.row(row).iter().filter_map(|c| c.special()));
                self.remove_row(row);
                cleared += 1;
            } else {
                y -= 1;
            }
        }
        (cleared, specials)
    }

    /// Pushes the stack up by `count` garbage rows, each with one hole.
    ///
    /// Returns true when filled cells were pushed off the top.
    pub fn add_lines<R: Rng>(&mut self, count: u32, rng: &mut R) -> bool {
        // Past the field height every row is garbage and the stack overflowed
        let mut overflow = count as usize > FIELD_HEIGHT;
        for _ in 0..(count as usize).min(FIELD_HEIGHT) {
            if self.row(0).iter().any(|c| !c.is_empty()) {
                overflow = true;
            }
            self.cells.copy_within(FIELD_WIDTH.., 0);
            let hole = rng.gen_range(0..FIELD_WIDTH);
            let bottom = (FIELD_HEIGHT - 1) * FIELD_WIDTH;
            for x in 0..FIELD_WIDTH {
                self.cells[bottom + x] = if x == hole {
                    Cell::Nothing
                } else {
                    COLORS[rng.gen_range(0..COLORS.len())]
                };
            }
        }
        overflow
    }

    /// Number of rows from the bottom up to the highest filled cell.
    pub fn stack_height(&self) -> usize {
        (0..FIELD_HEIGHT)
            .find(|y| self.row(*y).iter().any(|c| !c.is_empty()))
            .map_or(0, |top| FIELD_HEIGHT - top)
    }

    /// Turns a random coloured cell into `special`. Returns false if the
    /// grid holds no plain colour.
    pub fn place_special<R: Rng>(&mut self, special: Special, rng: &mut R) -> bool {
        let candidates: Vec<usize> = (0..FIELD_SIZE)
            .filter(|i| self.cells[*i].is_color())
            .collect();
        if candidates.is_empty() || special == Special::Nothing {
            return false;
        }
        let i = candidates[rng.gen_range(0..candidates.len())];
        self.cells[i] = special.cell();
        true
    }

    /// Applies a received special to this field.
    ///
    /// `SwitchFields` needs the sender's grid and is left to the caller, as
    /// are the TetriNET2 effects; both return false.
    pub fn apply_special<R: Rng>(&mut self, special: Special, rng: &mut R) -> bool {
        match special {
            Special::AddLine => {
                self.add_lines(1, rng);
            }
            Special::ClearLine => self.remove_row(FIELD_HEIGHT - 1),
            Special::NukeField => self.cells = [Cell::Nothing; FIELD_SIZE],
            Special::RandomBlocksClear => {
                for _ in 0..10 {
                    let i = rng.gen_range(0..FIELD_SIZE);
                    self.cells[i] = Cell::Nothing;
                }
            }
            Special::ClearSpecialBlocks => {
                for cell in self.cells.iter_mut().filter(|c| c.special().is_some()) {
                    *cell = COLORS[rng.gen_range(0..COLORS.len())];
                }
            }
            Special::Gravity => self.collapse_down(),
            Special::LeftGravity => self.collapse_left(),
            Special::QuakeField => {
                for y in 0..FIELD_HEIGHT {
                    let shift = rng.gen_range(0..=2);
                    let row = &mut self.cells[y * FIELD_WIDTH..(y + 1) * FIELD_WIDTH];
                    if rng.gen_bool(0.5) {
                        row.rotate_left(shift);
                    } else {
                        row.rotate_right(shift);
                    }
                }
            }
            Special::BlockBomb => self.explode_bombs(rng),
            _ => return false,
        }
        true
    }

    fn collapse_down(&mut self) {
        for x in 0..FIELD_WIDTH {
            let column: Vec<Cell> = (0..FIELD_HEIGHT)
                .map(|y| self.cells[x + y * FIELD_WIDTH])
                .filter(|c| !c.is_empty())
                .collect();
            let gap = FIELD_HEIGHT - column.len();
            for y in 0..FIELD_HEIGHT {
                self.cells[x + y * FIELD_WIDTH] = if y < gap {
                    Cell::Nothing
                } else {
                    column[y - gap]
                };
            }
        }
    }

    fn collapse_left(&mut self) {
        for y in 0..FIELD_HEIGHT {
            let row = &mut self.cells[y * FIELD_WIDTH..(y + 1) * FIELD_WIDTH];
            let filled: Vec<Cell> = row.iter().copied().filter(|c| !c.is_empty()).collect();
            row.fill(Cell::Nothing);
            row[..filled.len()].copy_from_slice(&filled);
        }
    }

    fn explode_bombs<R: Rng>(&mut self, rng: &mut R) {
        let bombs: Vec<(i32, i32)> = (0..FIELD_SIZE)
            .filter(|i| self.cells[*i] == Cell::BlockBomb)
            .map(|i| ((i % FIELD_WIDTH) as i32, (i / FIELD_WIDTH) as i32))
            .collect();
        let mut debris = Vec::new();
        for (bx, by) in &bombs {
            self.set_cell(Cell::Nothing, *bx, *by);
        }
        for (bx, by) in bombs {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if let Some(i) = Self::index(bx + dx, by + dy) {
                        if !self.cells[i].is_empty() {
                            debris.push(self.cells[i]);
                            self.cells[i] = Cell::Nothing;
                        }
                    }
                }
            }
        }
        // scattered below the top six rows
        for cell in debris {
            let x = rng.gen_range(0..FIELD_WIDTH as i32);
            let y = rng.gen_range(6..FIELD_HEIGHT as i32);
            self.set_cell(cell, x, y);
        }
    }
}
