use crate::types::{CharacterClass, Race};

pub const DEFAULT_MAP: &str = "village_of_gludin";

pub const RECONCILE_INTERVAL_MS: u64 = 15_000;
pub const MONSTER_RESPAWN_MS: u64 = 30_000;
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub const BASE_HIT_CHANCE: f32 = 0.80;
pub const HIT_CHANCE_PER_DEX: f32 = 0.01;
pub const MAX_HIT_CHANCE: f32 = 0.95;

pub const BASE_CRITICAL_CHANCE: f32 = 0.05;
pub const CRITICAL_CHANCE_PER_LUK: f32 = 0.005;
pub const MAX_CRITICAL_CHANCE: f32 = 0.30;

pub const CRITICAL_MULTIPLIER: f32 = 1.5;
pub const DAMAGE_VARIATION_MIN: f32 = 0.9;
pub const DAMAGE_VARIATION_MAX: f32 = 1.1;

pub fn exp_for_level(level: i32) -> i64 {
    if level <= 0 {
        return 0;
    }
    100 * (level as i64) * (level as i64)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelUpGains {
    pub str: i32,
    pub dex: i32,
    pub vit: i32,
    pub int: i32,
    pub luk: i32,
    pub hp: i32,
    pub mp: i32,
}

pub fn level_up_gains(class: CharacterClass) -> LevelUpGains {
    match class {
        CharacterClass::Warrior => LevelUpGains {
            str: 3,
            dex: 1,
            vit: 2,
            int: 0,
            luk: 1,
            hp: 20,
            mp: 5,
        },
        CharacterClass::Mage => LevelUpGains {
            str: 0,
            dex: 1,
            vit: 1,
            int: 3,
            luk: 2,
            hp: 10,
            mp: 25,
        },
        CharacterClass::Archer => LevelUpGains {
            str: 1,
            dex: 3,
            vit: 1,
            int: 1,
            luk: 1,
            hp: 15,
            mp: 10,
        },
        CharacterClass::Rogue => LevelUpGains {
            str: 1,
            dex: 3,
            vit: 1,
            int: 0,
            luk: 2,
            hp: 12,
            mp: 8,
        },
        CharacterClass::Cleric => LevelUpGains {
            str: 1,
            dex: 1,
            vit: 2,
            int: 2,
            luk: 1,
            hp: 18,
            mp: 15,
        },
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BaseStats {
    pub str: i32,
    pub dex: i32,
    pub vit: i32,
    pub int: i32,
    pub luk: i32,
    pub hp: i32,
    pub mp: i32,
}

/// Starting stats for a fresh character: class baseline plus race
/// modifiers, with vitality and intelligence bonuses feeding into the
/// HP/MP pools.
pub fn base_stats(class: CharacterClass, race: Race) -> BaseStats {
    let class_base = match class {
        CharacterClass::Warrior => BaseStats {
            str: 15,
            dex: 10,
            vit: 13,
            int: 8,
            luk: 9,
            hp: 120,
            mp: 30,
        },
        CharacterClass::Mage => BaseStats {
            str: 8,
            dex: 10,
            vit: 9,
            int: 15,
            luk: 13,
            hp: 80,
            mp: 100,
        },
        CharacterClass::Archer => BaseStats {
            str: 10,
            dex: 15,
            vit: 10,
            int: 9,
            luk: 11,
            hp: 90,
            mp: 50,
        },
        CharacterClass::Rogue => BaseStats {
            str: 11,
            dex: 15,
            vit: 10,
            int: 8,
            luk: 11,
            hp: 85,
            mp: 45,
        },
        CharacterClass::Cleric => BaseStats {
            str: 10,
            dex: 9,
            vit: 12,
            int: 13,
            luk: 11,
            hp: 100,
            mp: 80,
        },
    };
    let (str_mod, dex_mod, vit_mod, int_mod, luk_mod) = match race {
        Race::Human => (1, 1, 1, 1, 1),
        Race::Elf => (0, 2, 0, 2, 1),
        Race::DarkElf => (1, 2, 0, 1, 1),
        Race::Orc => (2, 0, 2, -1, 0),
        Race::Dwarf => (2, 0, 2, 0, 0),
    };

    BaseStats {
        str: class_base.str + str_mod,
        dex: class_base.dex + dex_mod,
        vit: class_base.vit + vit_mod,
        int: class_base.int + int_mod,
        luk: class_base.luk + luk_mod,
        hp: class_base.hp + vit_mod * 5,
        mp: class_base.mp + int_mod * 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_requirement_is_quadratic() {
        assert_eq!(exp_for_level(1), 100);
        assert_eq!(exp_for_level(2), 400);
        assert_eq!(exp_for_level(10), 10_000);
        assert_eq!(exp_for_level(0), 0);
    }

    #[test]
    fn base_stats_apply_race_modifiers_to_pools() {
        let human_warrior = base_stats(CharacterClass::Warrior, Race::Human);
        assert_eq!(
            human_warrior,
            BaseStats {
                str: 16,
                dex: 11,
                vit: 14,
                int: 9,
                luk: 10,
                hp: 125,
                mp: 33,
            }
        );

        // The orc int penalty drains the mana pool.
        let orc_mage = base_stats(CharacterClass::Mage, Race::Orc);
        assert_eq!(orc_mage.int, 14);
        assert_eq!(orc_mage.mp, 97);
        assert_eq!(orc_mage.hp, 90);
    }

    #[test]
    fn every_class_gains_hp_and_mp_on_level_up() {
        for class in [
            CharacterClass::Warrior,
            CharacterClass::Mage,
            CharacterClass::Archer,
            CharacterClass::Rogue,
            CharacterClass::Cleric,
        ] {
            let gains = level_up_gains(class);
            assert!(gains.hp > 0);
            assert!(gains.mp > 0);
        }
    }
}
