use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{exp_for_level, level_up_gains};
use crate::types::{CharacterClass, CharacterView, MonsterView, Race};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("character {0} not found")]
    CharacterNotFound(i64),
    #[error("monster {0} not found")]
    MonsterNotFound(i64),
    #[error("monster {0} is already dead")]
    MonsterDead(i64),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub id: i64,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRecord {
    pub id: i64,
    pub account_id: i64,
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
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub pos_x: f32,
    pub pos_y: f32,
    pub pos_z: f32,
    pub map: String,
    #[serde(default)]
    pub last_played: Option<String>,
}

impl CharacterRecord {
    pub fn to_view(&self) -> CharacterView {
        CharacterView {
            id: self.id,
            name: self.name.clone(),
            class: self.class,
            race: self.race,
            level: self.level,
            exp: self.exp,
            str: self.str,
            dex: self.dex,
            vit: self.vit,
            int: self.int,
            luk: self.luk,
            hp: self.hp,
            max_hp: self.max_hp,
            mp: self.mp,
            max_mp: self.max_mp,
            pos_x: self.pos_x,
            pos_y: self.pos_y,
            pos_z: self.pos_z,
            map: self.map.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterRecord {
    pub id: i64,
    pub name: String,
    pub map: String,
    pub level: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub atk: i32,
    pub def: i32,
    pub exp: i64,
    pub pos_x: f32,
    pub pos_y: f32,
    pub pos_z: f32,
    #[serde(default)]
    pub downed_at_ms: Option<u64>,
}

impl MonsterRecord {
    pub fn to_view(&self) -> MonsterView {
        MonsterView {
            id: self.id,
            name: self.name.clone(),
            level: self.level,
            hp: self.hp,
            max_hp: self.max_hp,
            pos_x: self.pos_x,
            pos_y: self.pos_y,
            pos_z: self.pos_z,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub status: String,
    pub current_players: usize,
    #[serde(default)]
    pub updated_at_iso: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct WorldFile {
    version: u8,
    #[serde(default)]
    accounts: Vec<AccountRecord>,
    #[serde(default)]
    characters: Vec<CharacterRecord>,
    #[serde(default)]
    monsters: Vec<MonsterRecord>,
    #[serde(default)]
    server_status: ServerStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonsterDamage {
    pub hp: i32,
    pub killed: bool,
    pub exp_reward: i64,
}

#[derive(Clone, Debug)]
pub struct ExperienceGrant {
    pub leveled_up: bool,
    pub character: CharacterRecord,
}

/// The persistence gateway. Every operation is a single atomic
/// read-modify-write on the in-memory records, which are authoritative;
/// the backing JSON file is durability only and a failed write is
/// logged without rolling the records back.
pub struct WorldStore {
    file_path: Option<PathBuf>,
    accounts: HashMap<i64, AccountRecord>,
    characters: HashMap<i64, CharacterRecord>,
    monsters: HashMap<i64, MonsterRecord>,
    server_status: ServerStatus,
}

impl WorldStore {
    pub fn new(file_path: PathBuf) -> Self {
        let loaded = load_world(&file_path);
        Self {
            file_path: Some(file_path),
            accounts: loaded.accounts.into_iter().map(|a| (a.id, a)).collect(),
            characters: loaded.characters.into_iter().map(|c| (c.id, c)).collect(),
            monsters: loaded.monsters.into_iter().map(|m| (m.id, m)).collect(),
            server_status: loaded.server_status,
        }
    }

    /// Store without a backing file, used by tests and tools that build
    /// a world before deciding where to write it.
    pub fn in_memory() -> Self {
        Self {
            file_path: None,
            accounts: HashMap::new(),
            characters: HashMap::new(),
            monsters: HashMap::new(),
            server_status: ServerStatus::default(),
        }
    }

    pub fn insert_account(&mut self, account: AccountRecord) {
        self.accounts.insert(account.id, account);
        self.save();
    }

    pub fn insert_character(&mut self, character: CharacterRecord) {
        self.characters.insert(character.id, character);
        self.save();
    }

    pub fn insert_monster(&mut self, monster: MonsterRecord) {
        self.monsters.insert(monster.id, monster);
        self.save();
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn monster_count(&self) -> usize {
        self.monsters.len()
    }

    /// Credential check. Hashing is the account service's concern; this
    /// gateway only answers whether the pair matches a known account.
    pub fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<&AccountRecord, StoreError> {
        self.accounts
            .values()
            .find(|account| account.username == username && account.password == password)
            .ok_or(StoreError::InvalidCredentials)
    }

    pub fn character(&self, character_id: i64) -> Result<&CharacterRecord, StoreError> {
        self.characters
            .get(&character_id)
            .ok_or(StoreError::CharacterNotFound(character_id))
    }

    pub fn update_position(
        &mut self,
        character_id: i64,
        pos_x: f32,
        pos_y: f32,
        pos_z: f32,
        map: Option<&str>,
    ) -> Result<(), StoreError> {
        let character = self
            .characters
            .get_mut(&character_id)
            .ok_or(StoreError::CharacterNotFound(character_id))?;
        character.pos_x = pos_x;
        character.pos_y = pos_y;
        character.pos_z = pos_z;
        if let Some(map) = map {
            character.map = map.to_string();
        }
        self.save();
        Ok(())
    }

    pub fn update_vitals(
        &mut self,
        character_id: i64,
        hp: Option<i32>,
        mp: Option<i32>,
    ) -> Result<(), StoreError> {
        let character = self
            .characters
            .get_mut(&character_id)
            .ok_or(StoreError::CharacterNotFound(character_id))?;
        if let Some(hp) = hp {
            character.hp = hp.clamp(0, character.max_hp);
        }
        if let Some(mp) = mp {
            character.mp = mp.clamp(0, character.max_mp);
        }
        self.save();
        Ok(())
    }

    pub fn touch_last_played(&mut self, character_id: i64) -> Result<(), StoreError> {
        let character = self
            .characters
            .get_mut(&character_id)
            .ok_or(StoreError::CharacterNotFound(character_id))?;
        character.last_played = Some(now_iso());
        self.save();
        Ok(())
    }

    pub fn monster(&self, monster_id: i64) -> Result<&MonsterRecord, StoreError> {
        self.monsters
            .get(&monster_id)
            .ok_or(StoreError::MonsterNotFound(monster_id))
    }

    pub fn monsters_on_map(&self, map: &str) -> Vec<&MonsterRecord> {
        let mut monsters: Vec<&MonsterRecord> = self
            .monsters
            .values()
            .filter(|monster| monster.map == map && monster.hp > 0)
            .collect();
        monsters.sort_by_key(|monster| monster.id);
        monsters
    }

    /// Applies one attack's damage as a single read-modify-write.
    /// Rejects attacks against an already-dead monster so near
    /// simultaneous kills can never both collect the reward.
    pub fn apply_monster_damage(
        &mut self,
        monster_id: i64,
        damage: i32,
        now_ms: u64,
    ) -> Result<MonsterDamage, StoreError> {
        let monster = self
            .monsters
            .get_mut(&monster_id)
            .ok_or(StoreError::MonsterNotFound(monster_id))?;
        if monster.hp <= 0 {
            return Err(StoreError::MonsterDead(monster_id));
        }

        monster.hp = (monster.hp - damage).max(0);
        let killed = monster.hp == 0;
        if killed {
            monster.downed_at_ms = Some(now_ms);
        }
        let outcome = MonsterDamage {
            hp: monster.hp,
            killed,
            exp_reward: monster.exp,
        };
        self.save();
        Ok(outcome)
    }

    /// Adds experience and applies at most one level-up per grant, with
    /// class stat gains and a full HP/MP restore to the new maximums.
    pub fn add_experience(
        &mut self,
        character_id: i64,
        exp: i64,
    ) -> Result<ExperienceGrant, StoreError> {
        let character = self
            .characters
            .get_mut(&character_id)
            .ok_or(StoreError::CharacterNotFound(character_id))?;
        character.exp += exp;

        let leveled_up = character.exp >= exp_for_level(character.level + 1);
        if leveled_up {
            let gains = level_up_gains(character.class);
            character.level += 1;
            character.str += gains.str;
            character.dex += gains.dex;
            character.vit += gains.vit;
            character.int += gains.int;
            character.luk += gains.luk;
            character.max_hp += gains.hp;
            character.max_mp += gains.mp;
            character.hp = character.max_hp;
            character.mp = character.max_mp;
            info!(
                "character {} reached level {}",
                character.name, character.level
            );
        }

        let grant = ExperienceGrant {
            leveled_up,
            character: character.clone(),
        };
        self.save();
        Ok(grant)
    }

    /// Brings back monsters that have been down for at least `delay_ms`,
    /// restored to full HP. Returns the respawned monsters' id, map and
    /// hp so callers can notify the affected map groups.
    pub fn respawn_downed_monsters(
        &mut self,
        now_ms: u64,
        delay_ms: u64,
    ) -> Vec<(i64, String, i32)> {
        let mut respawned = Vec::new();
        for monster in self.monsters.values_mut() {
            let Some(downed_at_ms) = monster.downed_at_ms else {
                continue;
            };
            if now_ms.saturating_sub(downed_at_ms) < delay_ms {
                continue;
            }
            monster.hp = monster.max_hp;
            monster.downed_at_ms = None;
            respawned.push((monster.id, monster.map.clone(), monster.hp));
        }
        if !respawned.is_empty() {
            respawned.sort_by_key(|(id, _, _)| *id);
            self.save();
        }
        respawned
    }

    pub fn record_server_status(&mut self, current_players: usize) {
        self.server_status = ServerStatus {
            status: "online".to_string(),
            current_players,
            updated_at_iso: Some(now_iso()),
        };
        self.save();
    }

    pub fn server_status(&self) -> &ServerStatus {
        &self.server_status
    }

    fn save(&self) {
        let Some(file_path) = self.file_path.as_ref() else {
            return;
        };
        if let Some(parent) = file_path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                error!(
                    "failed to create world store dir {}: {err}",
                    parent.display()
                );
                return;
            }
        }

        let mut accounts: Vec<AccountRecord> = self.accounts.values().cloned().collect();
        accounts.sort_by_key(|account| account.id);
        let mut characters: Vec<CharacterRecord> = self.characters.values().cloned().collect();
        characters.sort_by_key(|character| character.id);
        let mut monsters: Vec<MonsterRecord> = self.monsters.values().cloned().collect();
        monsters.sort_by_key(|monster| monster.id);

        let file = WorldFile {
            version: 1,
            accounts,
            characters,
            monsters,
            server_status: self.server_status.clone(),
        };
        let payload = match serde_json::to_string_pretty(&file) {
            Ok(payload) => payload,
            Err(err) => {
                error!("failed to serialize world store: {err}");
                return;
            }
        };
        if let Err(err) = fs::write(file_path, payload) {
            error!("failed to write world store {}: {err}", file_path.display());
        }
    }
}

fn load_world(file_path: &PathBuf) -> WorldFile {
    let raw = match fs::read_to_string(file_path) {
        Ok(raw) => raw,
        Err(_) => return WorldFile::default(),
    };
    match serde_json::from_str::<WorldFile>(&raw) {
        Ok(file) => file,
        Err(err) => {
            error!(
                "world store {} is unreadable, starting empty: {err}",
                file_path.display()
            );
            WorldFile::default()
        }
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn warrior(id: i64, account_id: i64, name: &str) -> CharacterRecord {
        CharacterRecord {
            id,
            account_id,
            name: name.to_string(),
            class: CharacterClass::Warrior,
            race: Race::Human,
            level: 1,
            exp: 0,
            str: 16,
            dex: 11,
            vit: 14,
            int: 9,
            luk: 10,
            hp: 125,
            max_hp: 125,
            mp: 33,
            max_mp: 33,
            pos_x: 2.0,
            pos_y: 1.0,
            pos_z: 2.0,
            map: "village_of_gludin".to_string(),
            last_played: None,
        }
    }

    fn wolf(id: i64, hp: i32) -> MonsterRecord {
        MonsterRecord {
            id,
            name: "Gray Wolf".to_string(),
            map: "village_of_gludin".to_string(),
            level: 2,
            hp,
            max_hp: hp.max(30),
            atk: 8,
            def: 3,
            exp: 120,
            pos_x: 10.0,
            pos_y: 0.0,
            pos_z: 8.0,
            downed_at_ms: None,
        }
    }

    fn store_with_world() -> WorldStore {
        let mut store = WorldStore::in_memory();
        store.insert_account(AccountRecord {
            id: 1,
            username: "alice".to_string(),
            password: "wonder".to_string(),
        });
        store.insert_character(warrior(1, 1, "Aria"));
        store.insert_monster(wolf(12, 30));
        store
    }

    #[test]
    fn credentials_must_match_exactly() {
        let store = store_with_world();
        assert!(store.verify_credentials("alice", "wonder").is_ok());
        assert_eq!(
            store.verify_credentials("alice", "wrong"),
            Err(StoreError::InvalidCredentials)
        );
        assert_eq!(
            store.verify_credentials("nobody", "wonder"),
            Err(StoreError::InvalidCredentials)
        );
    }

    #[test]
    fn kill_threshold_sets_hp_to_zero_and_reports_the_reward() {
        let mut store = store_with_world();
        // Overkill: 35 damage against 30 hp.
        let outcome = store
            .apply_monster_damage(12, 35, 1_000)
            .expect("damage should apply");
        assert_eq!(
            outcome,
            MonsterDamage {
                hp: 0,
                killed: true,
                exp_reward: 120,
            }
        );
        assert_eq!(store.monster(12).unwrap().downed_at_ms, Some(1_000));
    }

    #[test]
    fn two_lethal_hits_produce_exactly_one_kill() {
        let mut store = store_with_world();
        store.insert_monster(wolf(13, 10));

        let first = store
            .apply_monster_damage(13, 6, 0)
            .expect("first hit should land");
        assert_eq!(first.hp, 4);
        assert!(!first.killed);

        let second = store
            .apply_monster_damage(13, 6, 1)
            .expect("second hit should land");
        assert_eq!(second.hp, 0);
        assert!(second.killed);

        // Any further attack sees a dead monster and must not grant again.
        assert_eq!(
            store.apply_monster_damage(13, 6, 2),
            Err(StoreError::MonsterDead(13))
        );
    }

    #[test]
    fn experience_boundary_grants_exactly_one_level() {
        let mut store = store_with_world();

        // Level 2 requires floor(100 * 2^2) = 400 exp.
        let grant = store.add_experience(1, 99).expect("grant should apply");
        assert!(!grant.leveled_up);
        assert_eq!(grant.character.level, 1);
        assert_eq!(grant.character.exp, 99);

        let grant = store.add_experience(1, 301).expect("grant should apply");
        assert!(grant.leveled_up);
        assert_eq!(grant.character.level, 2);
        assert_eq!(grant.character.exp, 400);
        // Warrior gains and a full restore to the new maximums.
        assert_eq!(grant.character.str, 19);
        assert_eq!(grant.character.max_hp, 145);
        assert_eq!(grant.character.hp, 145);
        assert_eq!(grant.character.mp, grant.character.max_mp);
    }

    #[test]
    fn a_huge_grant_still_levels_only_once() {
        let mut store = store_with_world();
        let grant = store.add_experience(1, 10_000).expect("grant should apply");
        assert!(grant.leveled_up);
        assert_eq!(grant.character.level, 2);
        // The remainder is kept; the next grant can level again.
        let grant = store.add_experience(1, 0).expect("grant should apply");
        assert!(grant.leveled_up);
        assert_eq!(grant.character.level, 3);
    }

    #[test]
    fn vitals_are_clamped_to_the_character_maximums() {
        let mut store = store_with_world();
        store
            .update_vitals(1, Some(9_999), Some(-10))
            .expect("update should apply");
        let character = store.character(1).unwrap();
        assert_eq!(character.hp, 125);
        assert_eq!(character.mp, 0);
    }

    #[test]
    fn position_update_can_change_map() {
        let mut store = store_with_world();
        store
            .update_position(1, 5.0, 0.0, 7.5, Some("gludin_harbor"))
            .expect("update should apply");
        let character = store.character(1).unwrap();
        assert_eq!(character.pos_x, 5.0);
        assert_eq!(character.map, "gludin_harbor");

        store
            .update_position(1, 6.0, 0.0, 7.5, None)
            .expect("update should apply");
        assert_eq!(store.character(1).unwrap().map, "gludin_harbor");
    }

    #[test]
    fn dead_monsters_are_hidden_from_map_listings_until_respawn() {
        let mut store = store_with_world();
        store
            .apply_monster_damage(12, 35, 1_000)
            .expect("kill should apply");
        assert!(store.monsters_on_map("village_of_gludin").is_empty());

        // Not yet due.
        assert!(store.respawn_downed_monsters(2_000, 30_000).is_empty());

        let respawned = store.respawn_downed_monsters(31_001, 30_000);
        assert_eq!(respawned.len(), 1);
        assert_eq!(respawned[0].0, 12);
        assert_eq!(respawned[0].2, 30);
        assert_eq!(store.monsters_on_map("village_of_gludin").len(), 1);
        assert_eq!(store.monster(12).unwrap().downed_at_ms, None);
    }

    #[test]
    fn missing_records_surface_typed_errors() {
        let mut store = WorldStore::in_memory();
        assert_eq!(
            store.character(9).err(),
            Some(StoreError::CharacterNotFound(9))
        );
        assert_eq!(
            store.apply_monster_damage(9, 1, 0),
            Err(StoreError::MonsterNotFound(9))
        );
        assert_eq!(
            store.update_position(9, 0.0, 0.0, 0.0, None),
            Err(StoreError::CharacterNotFound(9))
        );
    }

    #[test]
    fn world_survives_a_save_and_reload() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("world-store-test-{stamp}.json"));

        {
            let mut store = WorldStore::new(path.clone());
            store.insert_account(AccountRecord {
                id: 1,
                username: "alice".to_string(),
                password: "wonder".to_string(),
            });
            store.insert_character(warrior(1, 1, "Aria"));
            store.insert_monster(wolf(12, 30));
            store
                .apply_monster_damage(12, 5, 100)
                .expect("damage should apply");
        }

        let reloaded = WorldStore::new(path.clone());
        assert_eq!(reloaded.account_count(), 1);
        assert_eq!(reloaded.character(1).unwrap().name, "Aria");
        assert_eq!(reloaded.monster(12).unwrap().hp, 25);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_loads_an_empty_world() {
        let path = std::env::temp_dir().join("world-store-test-missing/does-not-exist.json");
        let store = WorldStore::new(path);
        assert_eq!(store.account_count(), 0);
        assert_eq!(store.monster_count(), 0);
    }
}
