//! Leader → worker command messages and the static command registry.
//!
//! Command names arrive as strings on the wire but are resolved once, on
//! intake, into the closed [`Command`] enum. Anything outside the registry
//! becomes [`Command::Unrecognized`] and fails at dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{AppError, Result};

/// Wire message carrying one command for one worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage {
    /// Opaque correlation token assigned by the sender.
    pub command_id: String,
    /// Registry name of the command (e.g. `collectBlock`).
    pub command: String,
    /// Named arguments.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl CommandMessage {
    /// Build a message with a freshly generated command id.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            command_id: Uuid::new_v4().to_string(),
            command: command.into(),
            args,
        }
    }

    /// Build a message with an explicit command id.
    #[must_use]
    pub fn with_id(
        command_id: impl Into<String>,
        command: impl Into<String>,
        args: Map<String, Value>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            command: command.into(),
            args,
        }
    }
}

/// A resolved command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Long-running skill executed through the action runtime.
    Skill(SkillCall),
    /// Instant read of the worker's own state.
    Query(Query),
    /// Halt whatever is running.
    Stop,
    /// Name outside the registry.
    Unrecognized(String),
}

impl Command {
    /// Resolve a registry name and its arguments.
    ///
    /// Unknown names resolve to [`Command::Unrecognized`]; known names with
    /// arguments that do not fit the schema are an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidArgs` when the arguments are malformed.
    pub fn parse(name: &str, args: &Map<String, Value>) -> Result<Self> {
        match name {
            "stop" => return Ok(Self::Stop),
            "getPosition" => return Ok(Self::Query(Query::Position)),
            "getInventory" => return Ok(Self::Query(Query::Inventory)),
            "getHealth" => return Ok(Self::Query(Query::Health)),
            _ => {}
        }

        if !SkillCall::NAMES.contains(&name) {
            return Ok(Self::Unrecognized(name.to_owned()));
        }

        let tagged = serde_json::json!({ "command": name, "args": Value::Object(args.clone()) });
        serde_json::from_value(tagged)
            .map(Self::Skill)
            .map_err(|err| AppError::InvalidArgs(format!("{name}: {err}")))
    }

    /// Registry name of this command.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Skill(call) => call.name(),
            Self::Query(Query::Position) => "getPosition",
            Self::Query(Query::Inventory) => "getInventory",
            Self::Query(Query::Health) => "getHealth",
            Self::Stop => "stop",
            Self::Unrecognized(name) => name,
        }
    }
}

/// Introspection commands answered from the worker's own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Current position.
    Position,
    /// Inventory listing.
    Inventory,
    /// Health and food levels.
    Health,
}

fn closeness_player() -> f64 {
    3.0
}

fn closeness_position() -> f64 {
    2.0
}

fn closeness_block() -> f64 {
    4.0
}

fn search_range() -> f64 {
    64.0
}

fn follow_distance() -> f64 {
    4.0
}

fn move_away_distance() -> f64 {
    5.0
}

fn dig_distance() -> u32 {
    1
}

fn one() -> u32 {
    1
}

fn stay_seconds() -> u64 {
    5
}

fn yes() -> bool {
    true
}

/// Skill invocations understood by workers, with their argument schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "camelCase")]
pub enum SkillCall {
    // Movement
    /// Walk to a player.
    GoToPlayer {
        /// Target player.
        player_name: String,
        /// Stop distance.
        #[serde(default = "closeness_player")]
        closeness: f64,
    },
    /// Walk to coordinates.
    GoToPosition {
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
        /// Z coordinate.
        z: f64,
        /// Stop distance.
        #[serde(default = "closeness_position")]
        closeness: f64,
    },
    /// Walk to the nearest block of a type.
    GoToNearestBlock {
        /// Block type.
        #[serde(rename = "type")]
        block_type: String,
        /// Stop distance.
        #[serde(default = "closeness_block")]
        closeness: f64,
        /// Search radius.
        #[serde(default = "search_range")]
        range: f64,
    },
    /// Follow a player until interrupted.
    FollowPlayer {
        /// Player to follow.
        player_name: String,
        /// Follow distance.
        #[serde(default = "follow_distance")]
        distance: f64,
    },
    /// Move away from the current spot.
    MoveAway {
        /// Distance to cover.
        #[serde(default = "move_away_distance")]
        distance: f64,
    },
    /// Climb to the surface.
    GoToSurface {},

    // Collection
    /// Mine and pick up blocks.
    CollectBlock {
        /// Block type.
        #[serde(rename = "type")]
        block_type: String,
        /// Amount to collect.
        #[serde(default = "one")]
        num: u32,
    },
    /// Attack the nearest entity of a type.
    AttackNearest {
        /// Entity type, or `hostile`.
        #[serde(rename = "type")]
        entity_type: String,
        /// Keep attacking until it dies.
        #[serde(default = "yes")]
        kill: bool,
    },

    // Inventory
    /// Hand items to a player.
    GiveToPlayer {
        /// Item to give.
        item_name: String,
        /// Receiving player.
        player_name: String,
        /// Amount.
        #[serde(default = "one")]
        num: u32,
    },
    /// Equip an item.
    Equip {
        /// Item to equip.
        item_name: String,
    },
    /// Drop items.
    Discard {
        /// Item to drop.
        item_name: String,
        /// Amount.
        #[serde(default = "one")]
        num: u32,
    },
    /// Store items in the nearest chest.
    PutInChest {
        /// Item to store.
        item_name: String,
        /// Amount.
        #[serde(default = "one")]
        num: u32,
    },
    /// Take items from the nearest chest.
    TakeFromChest {
        /// Item to take.
        item_name: String,
        /// Amount.
        #[serde(default = "one")]
        num: u32,
    },

    // Crafting
    /// Craft a recipe.
    CraftRecipe {
        /// Recipe name.
        recipe_name: String,
        /// Number of crafts.
        #[serde(default = "one")]
        num: u32,
    },
    /// Smelt items in a furnace.
    SmeltItem {
        /// Item to smelt.
        item_name: String,
        /// Amount.
        #[serde(default = "one")]
        num: u32,
    },

    // Building
    /// Place a block at coordinates.
    PlaceBlock {
        /// Block type.
        #[serde(rename = "type")]
        block_type: String,
        /// X coordinate.
        x: i64,
        /// Y coordinate.
        y: i64,
        /// Z coordinate.
        z: i64,
    },

    // Combat
    /// Attack a named entity.
    AttackEntity {
        /// Entity to attack.
        entity: String,
        /// Keep attacking until it dies.
        #[serde(default = "yes")]
        kill: bool,
    },

    // Utility
    /// Stand still.
    Stay {
        /// Seconds to stay.
        #[serde(default = "stay_seconds")]
        seconds: u64,
    },
    /// Eat or drink an item.
    Consume {
        /// Item to consume.
        item_name: String,
    },
    /// Sleep in the nearest bed.
    GoToBed {},
    /// Dig straight down.
    DigDown {
        /// Blocks to dig.
        #[serde(default = "dig_distance")]
        distance: u32,
    },
}

impl SkillCall {
    /// Every registry name that resolves to a skill.
    pub const NAMES: &'static [&'static str] = &[
        "goToPlayer",
        "goToPosition",
        "goToNearestBlock",
        "followPlayer",
        "moveAway",
        "goToSurface",
        "collectBlock",
        "attackNearest",
        "giveToPlayer",
        "equip",
        "discard",
        "putInChest",
        "takeFromChest",
        "craftRecipe",
        "smeltItem",
        "placeBlock",
        "attackEntity",
        "stay",
        "consume",
        "goToBed",
        "digDown",
    ];

    /// Registry name of the skill.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GoToPlayer { .. } => "goToPlayer",
            Self::GoToPosition { .. } => "goToPosition",
            Self::GoToNearestBlock { .. } => "goToNearestBlock",
            Self::FollowPlayer { .. } => "followPlayer",
            Self::MoveAway { .. } => "moveAway",
            Self::GoToSurface {} => "goToSurface",
            Self::CollectBlock { .. } => "collectBlock",
            Self::AttackNearest { .. } => "attackNearest",
            Self::GiveToPlayer { .. } => "giveToPlayer",
            Self::Equip { .. } => "equip",
            Self::Discard { .. } => "discard",
            Self::PutInChest { .. } => "putInChest",
            Self::TakeFromChest { .. } => "takeFromChest",
            Self::CraftRecipe { .. } => "craftRecipe",
            Self::SmeltItem { .. } => "smeltItem",
            Self::PlaceBlock { .. } => "placeBlock",
            Self::AttackEntity { .. } => "attackEntity",
            Self::Stay { .. } => "stay",
            Self::Consume { .. } => "consume",
            Self::GoToBed {} => "goToBed",
            Self::DigDown { .. } => "digDown",
        }
    }

    /// Whether an interrupted run should be resumed once the worker is idle.
    #[must_use]
    pub fn resumable(&self) -> bool {
        matches!(self, Self::FollowPlayer { .. })
    }

    /// Label under which the action runtime reports this skill.
    #[must_use]
    pub fn action_label(&self) -> String {
        format!("action:{}", self.name())
    }
}
