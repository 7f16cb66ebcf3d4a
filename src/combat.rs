use crate::constants::{
    BASE_CRITICAL_CHANCE, BASE_HIT_CHANCE, CRITICAL_CHANCE_PER_LUK, CRITICAL_MULTIPLIER,
    DAMAGE_VARIATION_MAX, DAMAGE_VARIATION_MIN, HIT_CHANCE_PER_DEX, MAX_CRITICAL_CHANCE,
    MAX_HIT_CHANCE,
};
use crate::rng::Rng;
use crate::types::{AttackResult, CharacterView};

pub fn hit_chance(dex: i32) -> f32 {
    (BASE_HIT_CHANCE + dex as f32 * HIT_CHANCE_PER_DEX).min(MAX_HIT_CHANCE)
}

pub fn critical_chance(luk: i32) -> f32 {
    (BASE_CRITICAL_CHANCE + luk as f32 * CRITICAL_CHANCE_PER_LUK).min(MAX_CRITICAL_CHANCE)
}

/// Damage for one landed hit. The critical multiplier applies to the
/// base before defense subtraction; the ±10% variation applies last and
/// the result never drops below 1.
pub fn attack_damage(attacker: &CharacterView, target_def: i32, is_critical: bool, variation: f32) -> i32 {
    let mut base = if attacker.class.is_magic() {
        (attacker.int * 2) as f32
    } else {
        (attacker.str * 2) as f32
    };
    if is_critical {
        base *= CRITICAL_MULTIPLIER;
    }
    let after_defense = (base - target_def as f32).max(1.0);
    ((after_defense * variation).floor() as i32).max(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttackRoll {
    pub result: AttackResult,
    pub damage: i32,
    pub is_critical: bool,
}

/// Per-attack resolution state machine: roll hit, roll critical only if
/// the hit landed, compute damage. Applying the damage (and the kill
/// override) is the store's job so HP mutation stays serialized per
/// monster.
pub struct CombatResolver {
    rng: Rng,
}

impl CombatResolver {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: Rng::new(seed),
        }
    }

    pub fn roll_attack(&mut self, attacker: &CharacterView, target_def: i32) -> AttackRoll {
        if !self.rng.chance(hit_chance(attacker.dex)) {
            return AttackRoll {
                result: AttackResult::Miss,
                damage: 0,
                is_critical: false,
            };
        }

        let is_critical = self.rng.chance(critical_chance(attacker.luk));
        let variation = self
            .rng
            .float_range(DAMAGE_VARIATION_MIN, DAMAGE_VARIATION_MAX);
        let damage = attack_damage(attacker, target_def, is_critical, variation);
        AttackRoll {
            result: if is_critical {
                AttackResult::Critical
            } else {
                AttackResult::Hit
            },
            damage,
            is_critical,
        }
    }
}
