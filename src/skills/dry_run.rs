//! Dry-run skill backend.
//!
//! Acknowledges every skill after a short simulated delay and keeps a tiny
//! amount of bookkeeping (position, inventory) so introspection commands
//! return plausible answers. Lets a leader drive real worker processes
//! without a game server.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{SkillLibrary, WorldConnector, WorldEvent, WorldSession};
use crate::models::command::{Query, SkillCall};
use crate::models::identity::AgentIdentity;
use crate::models::status::{Position, Vitals};
use crate::runtime::ActionContext;
use crate::{AppError, Result};

#[derive(Debug)]
struct Avatar {
    position: (f64, f64, f64),
    inventory: BTreeMap<String, u32>,
    health: f64,
    food: f64,
}

impl Default for Avatar {
    fn default() -> Self {
        Self {
            position: (0.0, 64.0, 0.0),
            inventory: BTreeMap::new(),
            health: 20.0,
            food: 20.0,
        }
    }
}

/// Skill library that pretends every skill succeeds.
#[derive(Debug)]
pub struct DryRunSkills {
    avatar: Mutex<Avatar>,
    step: Duration,
}

impl DryRunSkills {
    /// Backend that spends `step` per unit of simulated work.
    #[must_use]
    pub fn new(step: Duration) -> Self {
        Self {
            avatar: Mutex::new(Avatar::default()),
            step,
        }
    }

    fn avatar(&self) -> MutexGuard<'_, Avatar> {
        self.avatar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn work_units(&self, units: u32, ctx: &ActionContext) -> Result<()> {
        for done in 0..units {
            ctx.checkpoint()?;
            tokio::select! {
                () = ctx.cancelled() => {
                    return Err(AppError::Interrupted(format!("stopped after {done}/{units}")));
                }
                () = tokio::time::sleep(self.step) => {}
            }
            ctx.report(json!({ "progress": done + 1, "of": units }));
        }
        Ok(())
    }

    fn take_items(&self, item: &str, num: u32) -> Result<()> {
        let mut avatar = self.avatar();
        let have = avatar.inventory.get(item).copied().unwrap_or(0);
        if have < num {
            return Err(AppError::Skill(format!(
                "not enough {item}: have {have}, need {num}"
            )));
        }
        if have == num {
            avatar.inventory.remove(item);
        } else {
            avatar.inventory.insert(item.to_owned(), have - num);
        }
        Ok(())
    }

    fn add_items(&self, item: &str, num: u32) {
        *self.avatar().inventory.entry(item.to_owned()).or_default() += num;
    }

    async fn run(&self, call: SkillCall, ctx: ActionContext) -> Result<Value> {
        debug!(skill = call.name(), "dry-run skill");
        match call {
            SkillCall::GoToPosition { x, y, z, .. } => {
                self.work_units(3, &ctx).await?;
                self.avatar().position = (x, y, z);
                Ok(json!(format!("Arrived at ({x}, {y}, {z})")))
            }
            SkillCall::GoToPlayer { player_name, .. } => {
                self.work_units(3, &ctx).await?;
                Ok(json!(format!("Reached {player_name}")))
            }
            SkillCall::GoToNearestBlock { block_type, .. } => {
                self.work_units(3, &ctx).await?;
                Ok(json!(format!("Found {block_type}")))
            }
            SkillCall::FollowPlayer { player_name, .. } => {
                // Following only ends when interrupted.
                loop {
                    ctx.report(json!(format!("Following {player_name}")));
                    self.work_units(1, &ctx).await?;
                }
            }
            SkillCall::MoveAway { distance } => {
                self.work_units(2, &ctx).await?;
                self.avatar().position.0 += distance;
                Ok(json!(format!("Moved {distance} blocks away")))
            }
            SkillCall::GoToSurface {} => {
                self.work_units(2, &ctx).await?;
                Ok(json!("Reached the surface"))
            }
            SkillCall::CollectBlock { block_type, num } => {
                self.work_units(num, &ctx).await?;
                self.add_items(&block_type, num);
                Ok(json!(format!("Collected {num} {block_type}")))
            }
            SkillCall::AttackNearest { entity_type, .. } => {
                self.work_units(2, &ctx).await?;
                Ok(json!(format!("Defeated nearest {entity_type}")))
            }
            SkillCall::GiveToPlayer {
                item_name,
                player_name,
                num,
            } => {
                self.take_items(&item_name, num)?;
                self.work_units(1, &ctx).await?;
                Ok(json!(format!("Gave {num} {item_name} to {player_name}")))
            }
            SkillCall::Equip { item_name } => {
                if !self.avatar().inventory.contains_key(&item_name) {
                    return Err(AppError::Skill(format!("no {item_name} to equip")));
                }
                Ok(json!(format!("Equipped {item_name}")))
            }
            SkillCall::Discard { item_name, num } | SkillCall::PutInChest { item_name, num } => {
                self.take_items(&item_name, num)?;
                self.work_units(1, &ctx).await?;
                Ok(json!(format!("Removed {num} {item_name}")))
            }
            SkillCall::TakeFromChest { item_name, num } => {
                self.work_units(1, &ctx).await?;
                self.add_items(&item_name, num);
                Ok(json!(format!("Took {num} {item_name}")))
            }
            SkillCall::CraftRecipe { recipe_name, num } => {
                self.work_units(num, &ctx).await?;
                self.add_items(&recipe_name, num);
                Ok(json!(format!("Crafted {num} {recipe_name}")))
            }
            SkillCall::SmeltItem { item_name, num } => {
                self.take_items(&item_name, num)?;
                self.work_units(num, &ctx).await?;
                Ok(json!(format!("Smelted {num} {item_name}")))
            }
            SkillCall::PlaceBlock {
                block_type, x, y, z,
            } => {
                self.take_items(&block_type, 1)?;
                self.work_units(1, &ctx).await?;
                Ok(json!(format!("Placed {block_type} at ({x}, {y}, {z})")))
            }
            SkillCall::AttackEntity { entity, .. } => {
                self.work_units(2, &ctx).await?;
                Ok(json!(format!("Defeated {entity}")))
            }
            SkillCall::Stay { seconds } => {
                tokio::select! {
                    () = ctx.cancelled() => Err(AppError::Interrupted("stay cut short".into())),
                    () = tokio::time::sleep(Duration::from_secs(seconds)) => {
                        Ok(json!(format!("Stayed for {seconds}s")))
                    }
                }
            }
            SkillCall::Consume { item_name } => {
                self.take_items(&item_name, 1)?;
                let mut avatar = self.avatar();
                avatar.food = (avatar.food + 4.0).min(20.0);
                Ok(json!(format!("Consumed {item_name}")))
            }
            SkillCall::GoToBed {} => {
                self.work_units(2, &ctx).await?;
                Ok(json!("Slept through the night"))
            }
            SkillCall::DigDown { distance } => {
                self.work_units(distance, &ctx).await?;
                self.avatar().position.1 -= f64::from(distance);
                Ok(json!(format!("Dug down {distance} blocks")))
            }
        }
    }
}

impl SkillLibrary for DryRunSkills {
    fn invoke(
        &self,
        call: &SkillCall,
        ctx: ActionContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
        Box::pin(self.run(call.clone(), ctx))
    }

    fn query(&self, query: Query) -> Result<Value> {
        let avatar = self.avatar();
        Ok(match query {
            Query::Position => {
                let (x, y, z) = avatar.position;
                json!({ "x": x, "y": y, "z": z })
            }
            Query::Inventory => Value::Array(
                avatar
                    .inventory
                    .iter()
                    .map(|(name, count)| json!({ "name": name, "count": count }))
                    .collect(),
            ),
            Query::Health => json!({ "health": avatar.health, "food": avatar.food }),
        })
    }

    fn vitals(&self) -> Vitals {
        let avatar = self.avatar();
        let (x, y, z) = avatar.position;
        Vitals {
            position: Some(Position::floor(x, y, z)),
            health: avatar.health,
            food: avatar.food,
        }
    }

    fn halt(&self) {
        debug!("dry-run halt");
    }
}

/// Connector that hands every worker a fresh [`DryRunSkills`].
#[derive(Debug, Clone)]
pub struct DryRunWorld {
    step: Duration,
}

impl DryRunWorld {
    /// Connector whose skills spend `step` per unit of work.
    #[must_use]
    pub fn new(step: Duration) -> Self {
        Self { step }
    }
}

impl WorldConnector for DryRunWorld {
    fn connect(
        &self,
        identity: &AgentIdentity,
    ) -> Pin<Box<dyn Future<Output = Result<WorldSession>> + Send + '_>> {
        let name = identity.name().to_owned();
        Box::pin(async move {
            // The sender is dropped only with the session, so the event
            // stream stays open and silent.
            let (events_tx, events) = mpsc::channel::<WorldEvent>(16);
            let skills: Arc<dyn SkillLibrary> = Arc::new(DryRunSkills::new(self.step));
            info!(worker = name, "dry-run world connected");
            tokio::spawn(async move {
                events_tx.closed().await;
            });
            Ok(WorldSession { skills, events })
        })
    }
}
