use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterClass {
    Warrior,
    Mage,
    Archer,
    Rogue,
    Cleric,
}

impl CharacterClass {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "warrior" => Some(Self::Warrior),
            "mage" => Some(Self::Mage),
            "archer" => Some(Self::Archer),
            "rogue" => Some(Self::Rogue),
            "cleric" => Some(Self::Cleric),
            _ => None,
        }
    }

    /// Magic-affinity classes deal int-based damage instead of str-based.
    pub fn is_magic(self) -> bool {
        matches!(self, Self::Mage | Self::Cleric)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Race {
    Human,
    Elf,
    DarkElf,
    Orc,
    Dwarf,
}

impl Race {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "human" => Some(Self::Human),
            "elf" => Some(Self::Elf),
            "dark_elf" => Some(Self::DarkElf),
            "orc" => Some(Self::Orc),
            "dwarf" => Some(Self::Dwarf),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Player,
    Monster,
}

impl TargetType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "player" => Some(Self::Player),
            "monster" => Some(Self::Monster),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackResult {
    Miss,
    Hit,
    Critical,
    Kill,
}

/// Live per-session copy of a character, kept in sync with the store
/// after every confirmed write. Also the wire shape for
/// `enter_world_response`.
#[derive(Clone, Debug, Serialize)]
pub struct CharacterView {
    pub id: i64,
    pub name: String,
    pub class: CharacterClass,
    pub race: Race,
    pub level: i32,
    pub exp: i64,
    pub str: i32,
    pub dex: i32,
    pub vit: i32,
    pub int: i32,
    pub luk: i32,
    pub hp: i32,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
    pub mp: i32,
    #[serde(rename = "maxMp")]
    pub max_mp: i32,
    #[serde(rename = "posX")]
    pub pos_x: f32,
    #[serde(rename = "posY")]
    pub pos_y: f32,
    #[serde(rename = "posZ")]
    pub pos_z: f32,
    pub map: String,
}

/// Entry in `enter_world_response.spawnInfo.nearbyPlayers` and the
/// payload of `player_joined`.
#[derive(Clone, Debug, Serialize)]
pub struct NearbyPlayer {
    #[serde(rename = "characterId")]
    pub character_id: i64,
    pub name: String,
    pub class: CharacterClass,
    pub race: Race,
    pub level: i32,
    #[serde(rename = "posX")]
    pub pos_x: f32,
    #[serde(rename = "posY")]
    pub pos_y: f32,
    #[serde(rename = "posZ")]
    pub pos_z: f32,
}

impl NearbyPlayer {
    pub fn from_view(view: &CharacterView) -> Self {
        Self {
            character_id: view.id,
            name: view.name.clone(),
            class: view.class,
            race: view.race,
            level: view.level,
            pos_x: view.pos_x,
            pos_y: view.pos_y,
            pos_z: view.pos_z,
        }
    }
}

/// Wire shape for monsters in `enter_world_response.spawnInfo.monsters`.
#[derive(Clone, Debug, Serialize)]
pub struct MonsterView {
    pub id: i64,
    pub name: String,
    pub level: i32,
    pub hp: i32,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
    #[serde(rename = "posX")]
    pub pos_x: f32,
    #[serde(rename = "posY")]
    pub pos_y: f32,
    #[serde(rename = "posZ")]
    pub pos_z: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PresenceCounts {
    pub connected: usize,
    pub authenticated: usize,
    #[serde(rename = "inWorld")]
    pub in_world: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_parse_round_trips_wire_names() {
        for name in ["warrior", "mage", "archer", "rogue", "cleric"] {
            let class = CharacterClass::parse(name).expect("class should parse");
            let serialized = serde_json::to_string(&class).expect("class should serialize");
            assert_eq!(serialized, format!("\"{name}\""));
        }
        assert_eq!(CharacterClass::parse("paladin"), None);
    }

    #[test]
    fn only_mage_and_cleric_are_magic() {
        assert!(CharacterClass::Mage.is_magic());
        assert!(CharacterClass::Cleric.is_magic());
        assert!(!CharacterClass::Warrior.is_magic());
        assert!(!CharacterClass::Archer.is_magic());
        assert!(!CharacterClass::Rogue.is_magic());
    }

    #[test]
    fn target_type_parse_accepts_wire_values() {
        assert_eq!(TargetType::parse("player"), Some(TargetType::Player));
        assert_eq!(TargetType::parse("monster"), Some(TargetType::Monster));
        assert_eq!(TargetType::parse("npc"), None);
    }

    #[test]
    fn race_parse_accepts_underscore_names() {
        assert_eq!(Race::parse("dark_elf"), Some(Race::DarkElf));
        assert_eq!(Race::parse("gnome"), None);
    }
}
