use crate::field::Field;
use crate::inventory::Inventory;

/// A player as seen by either side of the connection.
///
/// Read-only consumers take `&User`; anything touching the field or the
/// inventory needs `&mut User`.
#[derive(Debug, Clone)]
pub struct User {
    id: i32,
    name: String,
    team_name: String,
    level: u32,
    score: i64,
    playing: bool,
    field: Field,
    inventory: Inventory,
}

impl User {
    pub fn new(id: i32, name: &str) -> Self {
        User {
            id,
            name: name.to_string(),
            team_name: String::new(),
            level: 1,
            score: 0,
            playing: false,
            field: Field::new(),
            inventory: Inventory::new(0),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    pub fn set_team_name(&mut self, team_name: &str) {
        self.team_name = team_name.trim().to_string();
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Levels start at 1; lower values are raised to 1.
    pub fn set_level(&mut self, level: u32) {
        self.level = level.max(1);
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    /// Adds `points`, never letting the score drop below zero.
    pub fn add_score(&mut self, points: i64) {
        self.score = self.score.saturating_add(points).max(0);
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut Field {
        &mut self.field
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }
}
