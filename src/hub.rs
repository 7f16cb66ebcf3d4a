use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info, warn};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::combat::CombatResolver;
use crate::constants::MONSTER_RESPAWN_MS;
use crate::presence::PresenceTracker;
use crate::protocol::ParsedClientMessage;
use crate::rooms::MapGroups;
use crate::session::{CombatTarget, SessionContext};
use crate::store::{StoreError, WorldStore};
use crate::types::{AttackResult, MonsterView, NearbyPlayer, PresenceCounts, TargetType};

pub const SUPERSEDED_CLOSE_CODE: u16 = 4001;

#[derive(Clone, Debug)]
pub enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
}

pub struct HubOptions {
    pub server_name: String,
    pub max_players: usize,
    pub combat_seed: u32,
}

/// The wired core of the world server: transport clients, presence
/// tiers, map groups, world sessions, the persistence gateway and the
/// combat resolver, all behind one mutation boundary. The transport
/// layer owns a `Mutex<WorldHub>` and every inbound event runs under
/// it, so tier, group and monster-HP mutations are serialized.
pub struct WorldHub {
    clients: HashMap<String, ClientContext>,
    presence: PresenceTracker,
    rooms: MapGroups,
    sessions: SessionContext,
    store: WorldStore,
    resolver: CombatResolver,
    server_name: String,
    max_players: usize,
}

impl WorldHub {
    pub fn new(store: WorldStore, options: HubOptions) -> Self {
        Self {
            clients: HashMap::new(),
            presence: PresenceTracker::new(),
            rooms: MapGroups::new(),
            sessions: SessionContext::new(),
            store,
            resolver: CombatResolver::new(options.combat_seed),
            server_name: options.server_name,
            max_players: options.max_players,
        }
    }

    pub fn handle_connect(&mut self, conn_id: &str, tx: mpsc::Sender<OutboundMessage>) {
        self.clients
            .insert(conn_id.to_string(), ClientContext { tx });
        self.presence.on_connect(conn_id, now_ms());
    }

    /// Removes the connection from every structure it belongs to. Safe
    /// to call repeatedly; only the first call after a world session
    /// existed emits the `player_left` notification.
    pub fn handle_disconnect(&mut self, conn_id: &str, reason: &str) {
        let removed_session = self.sessions.remove(conn_id);
        self.presence.on_disconnect(conn_id);
        self.rooms.remove_everywhere(conn_id);
        if self.clients.remove(conn_id).is_some() {
            info!("client disconnected: {conn_id} ({reason})");
        }
        if let Some(session) = removed_session {
            let character = session.character();
            let payload = json!({
                "type": "player_left",
                "characterId": character.id,
                "name": character.name,
            });
            self.broadcast_to_map(&character.map, &payload, Some(conn_id));
        }
    }

    pub fn handle_message(&mut self, conn_id: &str, message: ParsedClientMessage) {
        match message {
            ParsedClientMessage::Login { username, password } => {
                self.handle_login(conn_id, &username, &password);
            }
            ParsedClientMessage::EnterWorld { character_id } => {
                self.handle_enter_world(conn_id, character_id);
            }
            ParsedClientMessage::LeaveWorld => self.handle_leave_world(conn_id),
            ParsedClientMessage::Move {
                pos_x,
                pos_y,
                pos_z,
                map,
            } => self.handle_move(conn_id, pos_x, pos_y, pos_z, map),
            ParsedClientMessage::PlayerUpdate { hp, mp } => {
                self.handle_player_update(conn_id, hp, mp);
            }
            ParsedClientMessage::SelectTarget {
                target_id,
                target_type,
            } => self.handle_select_target(conn_id, target_id, target_type),
            ParsedClientMessage::Attack => self.handle_attack(conn_id),
            ParsedClientMessage::Ping { t } => {
                self.send_to(
                    conn_id,
                    &json!({ "type": "pong", "t": t }),
                    QueuePolicy::DisconnectOnFull,
                );
            }
        }
    }

    pub fn handle_invalid_message(&mut self, conn_id: &str, reason: &str) {
        warn!("invalid message from {conn_id}: {reason}");
        self.send_to(
            conn_id,
            &json!({ "type": "error", "success": false, "error": reason }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn handle_login(&mut self, conn_id: &str, username: &str, password: &str) {
        let account = match self.store.verify_credentials(username, password) {
            Ok(account) => (account.id, account.username.clone()),
            Err(StoreError::InvalidCredentials) => {
                self.respond_error(conn_id, "login_response", "invalid username or password");
                return;
            }
            Err(err) => {
                error!("credential check failed: {err}");
                self.respond_error(conn_id, "login_response", "internal server error");
                return;
            }
        };

        if !self
            .presence
            .on_authenticated(conn_id, account.0, &account.1, now_ms())
        {
            self.respond_error(conn_id, "login_response", "connection is not registered");
            return;
        }

        info!("login succeeded: {} ({conn_id})", account.1);
        self.send_to(
            conn_id,
            &json!({
                "type": "login_response",
                "success": true,
                "account": { "id": account.0, "username": account.1 },
            }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn handle_enter_world(&mut self, conn_id: &str, character_id: i64) {
        let Some(auth) = self.presence.authenticated_entry(conn_id).cloned() else {
            self.respond_error(conn_id, "enter_world_response", "not authenticated");
            return;
        };
        if self.sessions.get(conn_id).is_some() {
            self.respond_error(conn_id, "enter_world_response", "already in world");
            return;
        }

        let character = match self.store.character(character_id) {
            Ok(character) => character.clone(),
            Err(err) => {
                self.respond_error(conn_id, "enter_world_response", &err.to_string());
                return;
            }
        };
        if character.account_id != auth.account_id {
            warn!(
                "account {} requested foreign character {character_id}",
                auth.account_id
            );
            self.respond_error(
                conn_id,
                "enter_world_response",
                "character does not belong to this account",
            );
            return;
        }

        // One live world session per character: the newer connection
        // wins and the old one is closed out.
        if let Some(old_conn) = self
            .sessions
            .conn_for_character(character_id)
            .map(str::to_string)
        {
            info!(
                "world session for {} superseded: {old_conn} -> {conn_id}",
                character.name
            );
            if let Some(client) = self.clients.get(&old_conn) {
                let _ = client.tx.try_send(OutboundMessage::Close {
                    code: SUPERSEDED_CLOSE_CODE,
                    reason: "superseded by new connection".to_string(),
                });
            }
            self.handle_disconnect(&old_conn, "superseded by new connection");
        }

        if !self
            .presence
            .on_world_enter(conn_id, character_id, &character.name, now_ms())
        {
            self.respond_error(conn_id, "enter_world_response", "world entry rejected");
            return;
        }
        if let Err(err) = self.store.touch_last_played(character_id) {
            error!("failed to stamp last_played for {character_id}: {err}");
        }

        let view = character.to_view();
        self.sessions.insert(conn_id, view.clone());
        self.rooms.join(conn_id, &view.map);

        let joined = json!({
            "type": "player_joined",
            "characterId": view.id,
            "name": view.name,
            "class": view.class,
            "race": view.race,
            "level": view.level,
            "posX": view.pos_x,
            "posY": view.pos_y,
            "posZ": view.pos_z,
        });
        self.broadcast_to_map(&view.map, &joined, Some(conn_id));

        let nearby: Vec<NearbyPlayer> = self
            .rooms
            .members(&view.map)
            .iter()
            .filter(|member| member.as_str() != conn_id)
            .filter_map(|member| self.sessions.get(member))
            .map(|session| NearbyPlayer::from_view(session.character()))
            .collect();
        let monsters: Vec<MonsterView> = self
            .store
            .monsters_on_map(&view.map)
            .into_iter()
            .map(|monster| monster.to_view())
            .collect();

        self.send_to(
            conn_id,
            &json!({
                "type": "enter_world_response",
                "success": true,
                "character": &view,
                "spawnInfo": {
                    "x": view.pos_x,
                    "y": view.pos_y,
                    "z": view.pos_z,
                    "map": view.map,
                    "nearbyPlayers": nearby,
                    "monsters": monsters,
                },
            }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn handle_leave_world(&mut self, conn_id: &str) {
        let Some(session) = self.sessions.remove(conn_id) else {
            self.respond_error(conn_id, "leave_world_response", "no character selected");
            return;
        };
        let character = session.character();
        self.rooms.leave(conn_id, &character.map);
        let payload = json!({
            "type": "player_left",
            "characterId": character.id,
            "name": character.name,
        });
        self.broadcast_to_map(&character.map, &payload, Some(conn_id));
        self.presence.on_world_leave(conn_id);
        self.send_to(
            conn_id,
            &json!({ "type": "leave_world_response", "success": true }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn handle_move(&mut self, conn_id: &str, pos_x: f32, pos_y: f32, pos_z: f32, map: Option<String>) {
        let Some((character_id, character_name, current_map)) =
            self.sessions.get(conn_id).map(|session| {
                let character = session.character();
                (character.id, character.name.clone(), character.map.clone())
            })
        else {
            self.respond_error(conn_id, "move_response", "no character selected");
            return;
        };

        if let Err(err) = self
            .store
            .update_position(character_id, pos_x, pos_y, pos_z, map.as_deref())
        {
            error!("failed to persist position for {character_id}: {err}");
            self.respond_error(conn_id, "move_response", "internal server error");
            return;
        }

        let destination = map.unwrap_or_else(|| current_map.clone());
        if destination != current_map {
            // Contract: leave, join, then notify the old group and the
            // new group, in exactly this order.
            self.rooms.transfer(conn_id, &current_map, &destination);
            self.sessions.set_map(conn_id, &destination);
            self.sessions.set_position(conn_id, pos_x, pos_y, pos_z);

            let left = json!({
                "type": "player_left",
                "characterId": character_id,
                "name": character_name,
            });
            self.broadcast_to_map(&current_map, &left, Some(conn_id));

            if let Some(view) = self
                .sessions
                .get(conn_id)
                .map(|session| session.character().clone())
            {
                let joined = json!({
                    "type": "player_joined",
                    "characterId": view.id,
                    "name": view.name,
                    "class": view.class,
                    "race": view.race,
                    "level": view.level,
                    "posX": pos_x,
                    "posY": pos_y,
                    "posZ": pos_z,
                });
                self.broadcast_to_map(&destination, &joined, Some(conn_id));
            }
            info!("character {character_id} changed map: {current_map} -> {destination}");
        } else {
            self.sessions.set_position(conn_id, pos_x, pos_y, pos_z);
            let moved = json!({
                "type": "player_moved",
                "characterId": character_id,
                "posX": pos_x,
                "posY": pos_y,
                "posZ": pos_z,
                "map": destination,
            });
            self.broadcast_to_map(&destination, &moved, Some(conn_id));
        }

        self.send_to(
            conn_id,
            &json!({ "type": "move_response", "success": true }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn handle_player_update(&mut self, conn_id: &str, hp: Option<i32>, mp: Option<i32>) {
        let Some((character_id, map)) = self.sessions.get(conn_id).map(|session| {
            let character = session.character();
            (character.id, character.map.clone())
        }) else {
            self.respond_error(conn_id, "player_update_response", "no character selected");
            return;
        };

        if let Err(err) = self.store.update_vitals(character_id, hp, mp) {
            error!("failed to persist vitals for {character_id}: {err}");
            self.respond_error(conn_id, "player_update_response", "internal server error");
            return;
        }
        self.sessions.set_vitals(conn_id, hp, mp);

        if hp.is_some() {
            let payload = json!({
                "type": "player_stats_updated",
                "characterId": character_id,
                "stats": { "hp": hp, "mp": mp },
            });
            self.broadcast_to_map(&map, &payload, Some(conn_id));
        }

        self.send_to(
            conn_id,
            &json!({ "type": "player_update_response", "success": true }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn handle_select_target(&mut self, conn_id: &str, target_id: i64, target_type: TargetType) {
        if self.sessions.get(conn_id).is_none() {
            self.respond_error(conn_id, "select_target_response", "no character selected");
            return;
        }
        self.sessions.set_target(
            conn_id,
            CombatTarget {
                target_id,
                target_type,
            },
        );
        self.send_to(
            conn_id,
            &json!({ "type": "select_target_response", "success": true }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn handle_attack(&mut self, conn_id: &str) {
        let Some((attacker, target)) = self
            .sessions
            .get(conn_id)
            .map(|session| (session.character().clone(), session.target()))
        else {
            self.respond_error(conn_id, "attack_response", "no character selected");
            return;
        };
        let Some(target) = target else {
            self.respond_error(conn_id, "attack_response", "no target selected");
            return;
        };
        if target.target_type == TargetType::Player {
            self.respond_error(conn_id, "attack_response", "pvp combat is not implemented yet");
            return;
        }

        let monster = match self.store.monster(target.target_id) {
            Ok(monster) => monster.clone(),
            Err(err @ StoreError::MonsterNotFound(_)) => {
                self.respond_error(conn_id, "attack_response", &err.to_string());
                return;
            }
            Err(err) => {
                error!("monster lookup failed: {err}");
                self.respond_error(conn_id, "attack_response", "internal server error");
                return;
            }
        };
        if monster.hp <= 0 {
            self.respond_error(conn_id, "attack_response", "monster is already dead");
            return;
        }

        let roll = self.resolver.roll_attack(&attacker, monster.def);
        let (result, monster_hp) = if roll.result == AttackResult::Miss {
            (AttackResult::Miss, monster.hp)
        } else {
            match self
                .store
                .apply_monster_damage(monster.id, roll.damage, now_ms())
            {
                Ok(outcome) => {
                    if outcome.killed {
                        self.sessions.clear_targets_on(target);
                        // Exactly one reward per kill; the damage is
                        // already persisted, so a failed grant is logged
                        // and the kill stands.
                        match self.store.add_experience(attacker.id, outcome.exp_reward) {
                            Ok(grant) => {
                                self.sessions
                                    .refresh_character(conn_id, grant.character.to_view());
                            }
                            Err(err) => {
                                error!("experience grant after kill failed: {err}");
                            }
                        }
                        (AttackResult::Kill, outcome.hp)
                    } else {
                        (roll.result, outcome.hp)
                    }
                }
                Err(err @ StoreError::MonsterDead(_)) => {
                    self.respond_error(conn_id, "attack_response", &err.to_string());
                    return;
                }
                Err(err) => {
                    error!("failed to persist attack on {}: {err}", monster.id);
                    self.respond_error(conn_id, "attack_response", "internal server error");
                    return;
                }
            }
        };

        let update = json!({
            "type": "combat_update",
            "attackerId": attacker.id,
            "targetId": target.target_id,
            "targetType": target.target_type,
            "result": result,
            "damage": roll.damage,
            "isCritical": roll.is_critical,
            "monsterHp": monster_hp,
        });
        self.broadcast_to_map(&attacker.map, &update, Some(conn_id));

        self.send_to(
            conn_id,
            &json!({
                "type": "attack_response",
                "success": true,
                "attackerId": attacker.id,
                "targetId": target.target_id,
                "targetType": target.target_type,
                "result": result,
                "damage": roll.damage,
                "isCritical": roll.is_critical,
                "monsterHp": monster_hp,
            }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    /// Self-healing pass against connections that vanished without a
    /// close callback. Prunes every structure down to the transport's
    /// live set and notifies maps about silently departed characters;
    /// the resulting counts are recorded as the server status.
    pub fn reconcile(&mut self) -> PresenceCounts {
        let live: HashSet<String> = self
            .clients
            .iter()
            .filter(|(_, client)| !client.tx.is_closed())
            .map(|(conn_id, _)| conn_id.clone())
            .collect();
        self.clients.retain(|conn_id, _| live.contains(conn_id));
        self.presence.reconcile(&live);
        self.rooms.retain_live(&live);

        let dropped = self.sessions.retain_live(&live);
        for (conn_id, session) in dropped {
            let character = session.character();
            let payload = json!({
                "type": "player_left",
                "characterId": character.id,
                "name": character.name,
            });
            self.broadcast_to_map(&character.map, &payload, Some(&conn_id));
        }

        let counts = self.presence.counts();
        self.store.record_server_status(counts.in_world);
        counts
    }

    /// Presence counts after a reconcile pass.
    pub fn server_stats(&mut self) -> PresenceCounts {
        self.reconcile()
    }

    pub fn server_info(&mut self) -> Value {
        let counts = self.reconcile();
        json!({
            "name": self.server_name,
            "version": env!("CARGO_PKG_VERSION"),
            "maxPlayers": self.max_players,
            "onlinePlayers": counts.in_world,
            "authenticatedPlayers": counts.authenticated,
            "totalConnections": counts.connected,
            "status": self.store.server_status(),
        })
    }

    /// Brings back monsters past the respawn delay and tells their maps.
    pub fn respawn_monsters(&mut self, now_ms: u64) {
        for (monster_id, map, hp) in self
            .store
            .respawn_downed_monsters(now_ms, MONSTER_RESPAWN_MS)
        {
            info!("monster {monster_id} respawned on {map}");
            let payload = json!({
                "type": "monster_respawned",
                "monsterId": monster_id,
                "hp": hp,
            });
            self.broadcast_to_map(&map, &payload, None);
        }
    }

    fn respond_error(&mut self, conn_id: &str, response_type: &str, message: &str) {
        self.send_to(
            conn_id,
            &json!({ "type": response_type, "success": false, "error": message }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn send_to(&mut self, conn_id: &str, message: &Value, policy: QueuePolicy) {
        let send_failed = if let Some(client) = self.clients.get(conn_id) {
            client
                .tx
                .try_send(OutboundMessage::Text(message.to_string()))
                .is_err()
        } else {
            false
        };
        if send_failed && policy == QueuePolicy::DisconnectOnFull {
            self.handle_disconnect(conn_id, "outbound queue overflow");
        }
    }

    /// Fire-and-forget delivery to every group member except the
    /// origin; a full or dead queue never delays the rest.
    fn broadcast_to_map(&self, map: &str, message: &Value, exclude: Option<&str>) {
        let payload = message.to_string();
        for member in self.rooms.members(map) {
            if exclude == Some(member.as_str()) {
                continue;
            }
            if let Some(client) = self.clients.get(&member) {
                let _ = client.tx.try_send(OutboundMessage::Text(payload.clone()));
            }
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
