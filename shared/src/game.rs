//! Local game simulation for one player.
//!
//! [`GameManager`] owns the player's [`User`] and advances the falling block
//! one row per elapsed second. Elapsed time is accumulated and consumed in
//! whole seconds, so feeding `2.5s` at once or in small slices produces the
//! same steps.

use crate::block::{Block, BLOCKS};
use crate::cell::{Cell, Special};
use crate::field::FallingBlock;
use crate::options::GameOptions;
use crate::user::User;
use crate::FIELD_SIZE;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const BLOCK_STEP_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_LEVEL: u32 = 100;

/// Rows kept free at the top after a field switch.
const SWITCH_CLEAR_ROWS: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockStepState {
    #[default]
    Nothing,
    Wait,
    Move,
    Land,
    SelectNew,
    Loose,
}

/// Things the network layer has to tell the other players about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    BlockLanded { lines_cleared: u32 },
    LevelChanged { level: u32 },
    Lost,
}

pub struct GameManager {
    user: User,
    options: Arc<GameOptions>,
    state: BlockStepState,
    paused: bool,
    pending: Duration,
    last_update: Option<Instant>,
    lines_cleared: u32,
    lines_toward_level: u32,
    lines_toward_special: u32,
    events: Vec<GameEvent>,
    rng: StdRng,
}

impl GameManager {
    pub fn new(user: User, options: Arc<GameOptions>) -> Self {
        Self::with_rng(user, options, StdRng::from_entropy())
    }

    /// Deterministic block selection and garbage, for replays and tests.
    pub fn with_seed(user: User, options: Arc<GameOptions>, seed: u64) -> Self {
        Self::with_rng(user, options, StdRng::seed_from_u64(seed))
    }

    fn with_rng(user: User, options: Arc<GameOptions>, rng: StdRng) -> Self {
        let mut manager = GameManager {
            user,
            options,
            state: BlockStepState::Nothing,
            paused: false,
            pending: Duration::ZERO,
            last_update: None,
            lines_cleared: 0,
            lines_toward_level: 0,
            lines_toward_special: 0,
            events: Vec::new(),
            rng,
        };
        manager.start();
        manager
    }

    /// Starts over with new options, keeping the user.
    pub fn reset(&mut self, options: Arc<GameOptions>) {
        self.options = options;
        self.start();
    }

    fn start(&mut self) {
        self.state = BlockStepState::Nothing;
        self.paused = false;
        self.pending = Duration::ZERO;
        self.last_update = None;
        self.lines_cleared = 0;
        self.lines_toward_level = 0;
        self.lines_toward_special = 0;
        self.events.clear();

        let options = Arc::clone(&self.options);
        self.user.set_level(options.starting_level);
        self.user.set_playing(true);
        let inventory = self.user.inventory_mut();
        inventory.clear();
        inventory.set_capacity(options.special_capacity as usize);
        let field = self.user.field_mut();
        field.clear();
        field.add_lines(options.starting_height, &mut self.rng);

        let block = self.select_block();
        if !self.spawn_block(block) {
            self.lose();
        }
        info!(
            "Game started for {} at level {}",
            self.user.name(),
            self.user.level()
        );
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_mut(&mut self) -> &mut User {
        &mut self.user
    }

    pub fn options(&self) -> &GameOptions {
        &self.options
    }

    pub fn state(&self) -> BlockStepState {
        self.state
    }

    pub fn is_lost(&self) -> bool {
        self.state == BlockStepState::Loose
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused && !paused {
            self.last_update = None;
        }
        self.paused = paused;
    }

    pub fn lines_cleared(&self) -> u32 {
        self.lines_cleared
    }

    /// Time carried over towards the next step.
    pub fn pending_time(&self) -> Duration {
        self.pending
    }

    pub fn falling_block(&self) -> Option<&FallingBlock> {
        self.user.field().falling_block()
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advances by the wall-clock time since the previous call.
    pub fn update(&mut self, now: Instant) -> Vec<BlockStepState> {
        let elapsed = match self.last_update.replace(now) {
            Some(previous) => now.saturating_duration_since(previous),
            None => Duration::ZERO,
        };
        self.advance(elapsed)
    }

    /// Adds `elapsed` to the carry and runs one step per whole second.
    ///
    /// Time passing while paused or after a loss is discarded.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<BlockStepState> {
        let mut steps = Vec::new();
        if self.paused || self.is_lost() {
            return steps;
        }
        self.pending += elapsed;
        while self.pending >= BLOCK_STEP_INTERVAL {
            self.pending -= BLOCK_STEP_INTERVAL;
            let state = self.step();
            steps.push(state);
            if state == BlockStepState::Loose {
                self.pending = Duration::ZERO;
                break;
            }
        }
        steps
    }

    fn step(&mut self) -> BlockStepState {
        let next = match self.state {
            BlockStepState::Nothing | BlockStepState::Wait | BlockStepState::Move => {
                if self.move_block(0, 1, true) {
                    BlockStepState::Move
                } else {
                    BlockStepState::Land
                }
            }
            BlockStepState::Land => BlockStepState::SelectNew,
            BlockStepState::SelectNew => {
                let block = self.select_block();
                if self.spawn_block(block) {
                    BlockStepState::Move
                } else {
                    BlockStepState::Loose
                }
            }
            BlockStepState::Loose => BlockStepState::Loose,
        };
        if next == BlockStepState::Loose && self.state != BlockStepState::Loose {
            self.lose();
        }
        self.state = next;
        next
    }

    fn lose(&mut self) {
        info!("{} lost", self.user.name());
        self.state = BlockStepState::Loose;
        self.user.set_playing(false);
        self.user.field_mut().set_falling_block(None);
        self.events.push(GameEvent::Lost);
    }

    fn select_block(&mut self) -> Block {
        let table = &self.options.block_frequencies;
        if table.is_empty() {
            BLOCKS[self.rng.gen_range(0..BLOCKS.len())]
        } else {
            table[self.rng.gen_range(0..table.len())]
        }
    }

    /// Places `block` at the top. A blocked spawn is merged where it can be
    /// and reported as failure.
    pub fn spawn_block(&mut self, block: Block) -> bool {
        if block == Block::Nothing {
            return false;
        }
        self.user
            .field_mut()
            .set_falling_block(Some(FallingBlock::spawn(block)));
        self.move_block(0, 0, true)
    }

    fn can_act(&self) -> bool {
        !self.paused && !self.is_lost()
    }

    fn move_block(&mut self, dx: i32, dy: i32, land_on_failure: bool) -> bool {
        let Some(falling) = self.falling_block().copied() else {
            return false;
        };
        let moved = falling.offset(dx, dy);
        if self.user.field().fits(&moved) {
            self.user.field_mut().set_falling_block(Some(moved));
            return true;
        }
        if land_on_failure {
            self.land();
        }
        false
    }

    fn land(&mut self) {
        let field = self.user.field_mut();
        field.merge_falling();
        let (lines, specials) = field.clear_full_lines();
        for special in specials {
            self.user.inventory_mut().add(special);
        }
        self.state = BlockStepState::Land;
        if lines > 0 {
            debug!("{} cleared {} line(s)", self.user.name(), lines);
            self.lines_cleared += lines;
            self.advance_level(lines);
            self.spawn_specials(lines);
        }
        self.events.push(GameEvent::BlockLanded {
            lines_cleared: lines,
        });
    }

    fn advance_level(&mut self, lines: u32) {
        let per_level = self.options.lines_per_level.max(1);
        let before = self.user.level();
        let mut level = before;
        self.lines_toward_level += lines;
        while self.lines_toward_level >= per_level {
            self.lines_toward_level -= per_level;
            level = level
                .saturating_add(self.options.level_increment)
                .min(MAX_LEVEL);
        }
        if level != before {
            self.user.set_level(level);
            self.events.push(GameEvent::LevelChanged { level });
        }
    }

    fn spawn_specials(&mut self, lines: u32) {
        if !self.options.specials_enabled() {
            return;
        }
        let per_special = self.options.lines_per_special.max(1);
        self.lines_toward_special += lines;
        while self.lines_toward_special >= per_special {
            self.lines_toward_special -= per_special;
            let added = (self.options.specials_added as usize).min(FIELD_SIZE);
            for _ in 0..added {
                let table = &self.options.special_frequencies;
                let special = table[self.rng.gen_range(0..table.len())];
                if !self.user.field_mut().place_special(special, &mut self.rng) {
                    break;
                }
            }
        }
    }

    pub fn move_block_left(&mut self) -> bool {
        self.can_act() && self.move_block(-1, 0, false)
    }

    pub fn move_block_right(&mut self) -> bool {
        self.can_act() && self.move_block(1, 0, false)
    }

    /// Soft drop: one row down, landing if blocked.
    pub fn move_block_down(&mut self) -> bool {
        self.can_act() && self.move_block(0, 1, true)
    }

    /// Hard drop. True when the block moved at least one row.
    pub fn drop_block(&mut self) -> bool {
        if !self.can_act() {
            return false;
        }
        let mut moved = false;
        while self.move_block(0, 1, true) {
            moved = true;
        }
        moved
    }

    pub fn turn_block_left(&mut self) -> bool {
        self.turn_block(true)
    }

    pub fn turn_block_right(&mut self) -> bool {
        self.turn_block(false)
    }

    fn turn_block(&mut self, left: bool) -> bool {
        if !self.can_act() {
            return false;
        }
        let Some(falling) = self.falling_block().copied() else {
            return false;
        };
        let rotation = if left {
            falling.rotation.turned_left()
        } else {
            falling.rotation.turned_right()
        };
        let turned = falling.with_rotation(rotation);
        if !self.user.field().fits(&turned) {
            return false;
        }
        self.user.field_mut().set_falling_block(Some(turned));
        true
    }

    /// Removes `special` from the inventory so it can be sent.
    pub fn use_special(&mut self, special: Special) -> bool {
        self.can_act() && self.user.inventory_mut().use_special(special)
    }

    /// Garbage rows from an attack; overflowing the top loses the game.
    pub fn add_lines(&mut self, count: u32) -> bool {
        if self.is_lost() {
            return false;
        }
        if self.user.field_mut().add_lines(count, &mut self.rng) {
            self.lose();
        }
        true
    }

    /// Applies a special someone used on this player.
    pub fn receive_special(&mut self, special: Special) -> bool {
        if self.is_lost() {
            return false;
        }
        match special {
            Special::AddLine => self.add_lines(1),
            _ => self.user.field_mut().apply_special(special, &mut self.rng),
        }
    }

    /// Takes over another player's grid, clearing the top rows.
    pub fn switch_fields(&mut self, cells: &[Cell]) -> bool {
        if self.is_lost() || !self.user.field_mut().update_cells(cells) {
            return false;
        }
        let field = self.user.field_mut();
        for y in 0..SWITCH_CLEAR_ROWS {
            for x in 0..field.width() as i32 {
                field.set_cell(Cell::Nothing, x, y);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockRotation;
    use crate::FIELD_SIZE;
    use assert_approx_eq::assert_approx_eq;

    fn manager(seed: u64) -> GameManager {
        GameManager::with_seed(User::new(1, "tester"), Arc::new(GameOptions::default()), seed)
    }

    fn square_only() -> Arc<GameOptions> {
        Arc::new(GameOptions {
            block_frequencies: vec![Block::Square; 100],
            ..GameOptions::default()
        })
    }

    #[test]
    fn test_one_second_moves_block_down() {
        let mut game = manager(1);
        let start_y = game.falling_block().unwrap().y;
        assert_eq!(game.state(), BlockStepState::Nothing);

        let steps = game.advance(Duration::from_secs(1));
        assert_eq!(steps, vec![BlockStepState::Move]);
        assert_eq!(game.state(), BlockStepState::Move);
        assert_eq!(game.falling_block().unwrap().y, start_y + 1);
    }

    #[test]
    fn test_block_lands_then_new_block_selected() {
        let mut game = manager(2);
        let mut steps = 0;
        loop {
            let state = game.advance(BLOCK_STEP_INTERVAL)[0];
            steps += 1;
            if state == BlockStepState::Land {
                break;
            }
            assert_eq!(state, BlockStepState::Move);
            assert!(steps < 30);
        }
        assert!(game.falling_block().is_none());
        assert!(game.user().field().cells().iter().any(|c| !c.is_empty()));

        assert_eq!(game.advance(BLOCK_STEP_INTERVAL), vec![BlockStepState::SelectNew]);
        assert_eq!(game.advance(BLOCK_STEP_INTERVAL), vec![BlockStepState::Move]);
        assert!(game.falling_block().is_some());
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let mut sliced = manager(3);
        let mut whole = manager(3);
        for _ in 0..10 {
            sliced.advance(Duration::from_millis(250));
        }
        whole.advance(Duration::from_millis(2500));

        assert_eq!(sliced.falling_block(), whole.falling_block());
        assert_approx_eq!(sliced.pending_time().as_secs_f64(), 0.5, 1e-9);
        assert_approx_eq!(whole.pending_time().as_secs_f64(), 0.5, 1e-9);
    }

    #[test]
    fn test_sub_second_does_not_step() {
        let mut game = manager(4);
        assert!(game.advance(Duration::from_millis(999)).is_empty());
        assert_eq!(game.state(), BlockStepState::Nothing);
    }

    #[test]
    fn test_pause_discards_time() {
        let mut game = manager(5);
        game.set_paused(true);
        assert!(game.advance(Duration::from_secs(5)).is_empty());
        assert_eq!(game.pending_time(), Duration::ZERO);
        assert!(!game.move_block_left());

        game.set_paused(false);
        assert_eq!(game.advance(Duration::from_secs(1)).len(), 1);
    }

    #[test]
    fn test_drop_reports_movement() {
        let mut game = GameManager::with_seed(User::new(1, "d"), square_only(), 6);
        assert!(game.drop_block());
        assert!(game.falling_block().is_none());
        assert_eq!(game.state(), BlockStepState::Land);
        assert!(!game.drop_block());
        let events = game.take_events();
        assert_eq!(events, vec![GameEvent::BlockLanded { lines_cleared: 0 }]);
        assert_eq!(game.user().field().get_cell(5, 21), Cell::Yellow);
    }

    #[test]
    fn test_walls_stop_sideways_moves() {
        let mut game = GameManager::with_seed(User::new(1, "w"), square_only(), 7);
        let mut moves = 0;
        while game.move_block_left() {
            moves += 1;
        }
        assert_eq!(moves, 5);
        assert_eq!(game.falling_block().unwrap().x, 0);
        assert!(game.falling_block().is_some());
    }

    #[test]
    fn test_turn_without_room_fails() {
        let options = Arc::new(GameOptions {
            block_frequencies: vec![Block::Line; 100],
            ..GameOptions::default()
        });
        let mut game = GameManager::with_seed(User::new(1, "t"), options, 8);
        assert!(game.turn_block_left());
        assert!(game.turn_block_right());
        assert_eq!(game.falling_block().unwrap().rotation, BlockRotation::Deg0);

        assert_eq!(game.advance(Duration::from_secs(20)).len(), 20);
        assert_eq!(game.falling_block().unwrap().y, 20);
        // lying on the floor, a line has no room to stand up
        assert!(!game.turn_block_left());
        assert!(!game.turn_block_right());
    }

    #[test]
    fn test_blocked_spawn_loses() {
        let mut game = GameManager::with_seed(User::new(1, "l"), square_only(), 9);
        let mut full = [Cell::Red; FIELD_SIZE];
        for i in (0..FIELD_SIZE).step_by(12) {
            full[i] = Cell::Nothing;
        }
        game.user_mut().field_mut().update_cells(&full);
        game.user_mut().field_mut().set_falling_block(None);
        game.take_events();

        assert_eq!(game.advance(BLOCK_STEP_INTERVAL), vec![BlockStepState::Land]);
        assert_eq!(game.advance(BLOCK_STEP_INTERVAL), vec![BlockStepState::SelectNew]);
        assert_eq!(game.advance(BLOCK_STEP_INTERVAL), vec![BlockStepState::Loose]);
        assert!(game.is_lost());
        assert!(!game.user().is_playing());
        assert!(game.take_events().contains(&GameEvent::Lost));
        assert!(game.advance(Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_line_clear_levels_up_and_places_special() {
        let mut game = GameManager::with_seed(User::new(1, "c"), square_only(), 10);
        let field = game.user_mut().field_mut();
        for y in 20..22 {
            for x in 0..12 {
                if x != 5 && x != 6 {
                    field.set_cell(Cell::Blue, x, y);
                }
            }
        }
        field.set_cell(Cell::Green, 0, 19);
        assert!(game.drop_block());

        assert_eq!(game.lines_cleared(), 2);
        assert_eq!(game.user().level(), 2);
        let events = game.take_events();
        assert!(events.contains(&GameEvent::BlockLanded { lines_cleared: 2 }));
        assert!(events.contains(&GameEvent::LevelChanged { level: 2 }));
        // only one coloured cell is left to carry a special
        assert!(game.user().field().get_cell(0, 21).special().is_some());
    }

    #[test]
    fn test_extreme_options_saturate() {
        let options = Arc::new(GameOptions {
            lines_per_level: 1,
            level_increment: u32::MAX,
            specials_added: u32::MAX,
            block_frequencies: vec![Block::Square; 100],
            ..GameOptions::default()
        });
        let mut game = GameManager::with_seed(User::new(1, "x"), options, 12);
        let field = game.user_mut().field_mut();
        for y in 20..22 {
            for x in 0..12 {
                if x != 5 && x != 6 {
                    field.set_cell(Cell::Blue, x, y);
                }
            }
        }
        field.set_cell(Cell::Green, 0, 19);
        field.set_cell(Cell::Green, 1, 19);
        assert!(game.drop_block());

        assert_eq!(game.user().level(), MAX_LEVEL);
        assert!(game
            .take_events()
            .contains(&GameEvent::LevelChanged { level: MAX_LEVEL }));
        assert!(game.user().field().get_cell(0, 21).special().is_some());
        assert!(game.user().field().get_cell(1, 21).special().is_some());
    }

    #[test]
    fn test_starting_height_is_capped_by_field() {
        let options = Arc::new(GameOptions {
            starting_height: u32::MAX,
            ..GameOptions::default()
        });
        let game = GameManager::with_seed(User::new(1, "h"), options, 13);
        assert_eq!(game.user().field().stack_height(), crate::FIELD_HEIGHT);
    }

    #[test]
    fn test_special_pickup_and_use() {
        let mut game = GameManager::with_seed(User::new(1, "s"), square_only(), 11);
        let field = game.user_mut().field_mut();
        for x in 0..12 {
            if x != 5 && x != 6 {
                field.set_cell(Cell::Red, x, 21);
                field.set_cell(Cell::Red, x, 20);
            }
        }
        field.set_cell(Cell::Gravity, 0, 21);
        game.drop_block();
        assert_eq!(game.user().inventory().specials(), &[Special::Gravity]);
        assert!(game.use_special(Special::Gravity));
        assert!(!game.use_special(Special::Gravity));
    }

    #[test]
    fn test_add_lines_overflow_loses() {
        let mut game = manager(12);
        assert!(game.add_lines(4));
        assert_eq!(game.user().field().stack_height(), 4);
        assert!(!game.is_lost());
        assert!(game.add_lines(30));
        assert!(game.is_lost());
        assert!(!game.receive_special(Special::NukeField));
    }

    #[test]
    fn test_switch_fields_clears_top_rows() {
        let mut game = manager(13);
        let other = [Cell::Purple; FIELD_SIZE];
        assert!(game.switch_fields(&other));
        assert_eq!(game.user().field().get_cell(3, 5), Cell::Nothing);
        assert_eq!(game.user().field().get_cell(3, 6), Cell::Purple);
        assert!(!game.switch_fields(&other[..10]));
    }

    #[test]
    fn test_starting_height_and_reset() {
        let options = Arc::new(GameOptions {
            starting_height: 5,
            special_capacity: 3,
            ..GameOptions::default()
        });
        let mut game = GameManager::with_seed(User::new(1, "h"), options, 14);
        assert_eq!(game.user().field().stack_height(), 5);
        assert_eq!(game.user().inventory().capacity(), 3);

        game.reset(Arc::new(GameOptions::default()));
        assert_eq!(game.user().field().stack_height(), 0);
        assert_eq!(game.user().level(), 1);
        assert!(game.falling_block().is_some());
    }

    #[test]
    fn test_update_uses_wall_clock_delta() {
        let mut game = manager(15);
        let start = Instant::now();
        assert!(game.update(start).is_empty());
        let steps = game.update(start + Duration::from_millis(2100));
        assert_eq!(steps.len(), 2);
        assert_approx_eq!(game.pending_time().as_secs_f64(), 0.1, 1e-6);
    }
}
