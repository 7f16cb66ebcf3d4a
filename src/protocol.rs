use serde_json::Value;

use crate::types::TargetType;

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Login {
        username: String,
        password: String,
    },
    EnterWorld {
        character_id: i64,
    },
    LeaveWorld,
    Move {
        pos_x: f32,
        pos_y: f32,
        pos_z: f32,
        map: Option<String>,
    },
    PlayerUpdate {
        hp: Option<i32>,
        mp: Option<i32>,
    },
    SelectTarget {
        target_id: i64,
        target_type: TargetType,
    },
    Attack,
    Ping {
        t: f64,
    },
}

/// Parses an inbound JSON message, validating the shape of every event
/// at the boundary. Returns a descriptive reason when the payload does
/// not match its schema.
pub fn parse_client_message(raw: &str) -> Result<ParsedClientMessage, String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|_| "message is not valid json".to_string())?;
    let object = value
        .as_object()
        .ok_or_else(|| "message must be a json object".to_string())?;
    let message_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "message is missing a type field".to_string())?;

    match message_type {
        "login" => parse_login(object).ok_or_else(|| "username and password are required".into()),
        "enter_world" => {
            parse_enter_world(object).ok_or_else(|| "characterId is required".into())
        }
        "leave_world" => Ok(ParsedClientMessage::LeaveWorld),
        "move" => parse_move(object).ok_or_else(|| "posX, posY and posZ are required".into()),
        "player_update" => {
            parse_player_update(object).ok_or_else(|| "stats object is required".into())
        }
        "select_target" => {
            parse_select_target(object).ok_or_else(|| "targetId and targetType are required".into())
        }
        "attack" => Ok(ParsedClientMessage::Attack),
        "ping" => parse_ping(object).ok_or_else(|| "ping requires a finite t".into()),
        other => Err(format!("unknown message type: {other}")),
    }
}

fn parse_login(object: &serde_json::Map<String, Value>) -> Option<ParsedClientMessage> {
    let username = object.get("username")?.as_str()?.trim();
    let password = object.get("password")?.as_str()?;
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some(ParsedClientMessage::Login {
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn parse_enter_world(object: &serde_json::Map<String, Value>) -> Option<ParsedClientMessage> {
    let character_id = parse_id(object.get("characterId")?)?;
    Some(ParsedClientMessage::EnterWorld { character_id })
}

fn parse_move(object: &serde_json::Map<String, Value>) -> Option<ParsedClientMessage> {
    let pos_x = parse_coordinate(object.get("posX")?)?;
    let pos_y = parse_coordinate(object.get("posY")?)?;
    let pos_z = parse_coordinate(object.get("posZ")?)?;
    let map = match object.get("map") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_str()?.to_string()),
    };
    Some(ParsedClientMessage::Move {
        pos_x,
        pos_y,
        pos_z,
        map,
    })
}

fn parse_player_update(object: &serde_json::Map<String, Value>) -> Option<ParsedClientMessage> {
    let stats = object.get("stats")?.as_object()?;
    let hp = match stats.get("hp") {
        None => None,
        Some(value) => Some(i32::try_from(value.as_i64()?).ok()?),
    };
    let mp = match stats.get("mp") {
        None => None,
        Some(value) => Some(i32::try_from(value.as_i64()?).ok()?),
    };
    Some(ParsedClientMessage::PlayerUpdate { hp, mp })
}

fn parse_select_target(object: &serde_json::Map<String, Value>) -> Option<ParsedClientMessage> {
    let target_id = parse_id(object.get("targetId")?)?;
    let target_type = TargetType::parse(object.get("targetType")?.as_str()?)?;
    Some(ParsedClientMessage::SelectTarget {
        target_id,
        target_type,
    })
}

fn parse_ping(object: &serde_json::Map<String, Value>) -> Option<ParsedClientMessage> {
    let t = object.get("t")?.as_f64()?;
    if !t.is_finite() {
        return None;
    }
    Some(ParsedClientMessage::Ping { t })
}

// The Unity client sends database ids both as numbers and as strings.
fn parse_id(value: &Value) -> Option<i64> {
    if let Some(id) = value.as_i64() {
        return Some(id);
    }
    value.as_str()?.trim().parse::<i64>().ok()
}

fn parse_coordinate(value: &Value) -> Option<f32> {
    let number = value.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    Some(number as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_login_message() {
        let parsed = parse_client_message(r#"{"type":"login","username":"alice","password":"pw"}"#)
            .expect("login message should parse");
        assert_eq!(
            parsed,
            ParsedClientMessage::Login {
                username: "alice".to_string(),
                password: "pw".to_string(),
            }
        );
    }

    #[test]
    fn parse_login_rejects_blank_username() {
        let result = parse_client_message(r#"{"type":"login","username":"  ","password":"pw"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn parse_enter_world_accepts_numeric_and_string_ids() {
        let from_number = parse_client_message(r#"{"type":"enter_world","characterId":7}"#)
            .expect("numeric id should parse");
        let from_string = parse_client_message(r#"{"type":"enter_world","characterId":"7"}"#)
            .expect("string id should parse");
        assert_eq!(from_number, ParsedClientMessage::EnterWorld { character_id: 7 });
        assert_eq!(from_string, ParsedClientMessage::EnterWorld { character_id: 7 });
    }

    #[test]
    fn parse_move_requires_all_coordinates() {
        let result = parse_client_message(r#"{"type":"move","posX":1.0,"posY":2.0}"#);
        assert_eq!(result, Err("posX, posY and posZ are required".to_string()));
    }

    #[test]
    fn parse_move_with_optional_map() {
        let parsed = parse_client_message(
            r#"{"type":"move","posX":1.5,"posY":0.0,"posZ":-2.5,"map":"gludin_harbor"}"#,
        )
        .expect("move message should parse");
        match parsed {
            ParsedClientMessage::Move {
                pos_x,
                pos_y,
                pos_z,
                map,
            } => {
                assert_eq!(pos_x, 1.5);
                assert_eq!(pos_y, 0.0);
                assert_eq!(pos_z, -2.5);
                assert_eq!(map.as_deref(), Some("gludin_harbor"));
            }
            other => panic!("expected move message, got {other:?}"),
        }
    }

    #[test]
    fn parse_move_rejects_non_finite_coordinates() {
        let result = parse_client_message(r#"{"type":"move","posX":1e999,"posY":0,"posZ":0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn parse_select_target_message() {
        let parsed = parse_client_message(
            r#"{"type":"select_target","targetId":"12","targetType":"monster"}"#,
        )
        .expect("select_target should parse");
        assert_eq!(
            parsed,
            ParsedClientMessage::SelectTarget {
                target_id: 12,
                target_type: TargetType::Monster,
            }
        );
    }

    #[test]
    fn parse_select_target_rejects_unknown_target_type() {
        let result =
            parse_client_message(r#"{"type":"select_target","targetId":1,"targetType":"npc"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn parse_player_update_reads_optional_vitals() {
        let parsed =
            parse_client_message(r#"{"type":"player_update","stats":{"hp":50}}"#)
                .expect("player_update should parse");
        assert_eq!(
            parsed,
            ParsedClientMessage::PlayerUpdate {
                hp: Some(50),
                mp: None,
            }
        );
    }

    #[test]
    fn parse_player_update_requires_stats_object() {
        let result = parse_client_message(r#"{"type":"player_update"}"#);
        assert_eq!(result, Err("stats object is required".to_string()));
    }

    #[test]
    fn parse_attack_ignores_extra_fields() {
        let parsed = parse_client_message(r#"{"type":"attack","anything":true}"#)
            .expect("attack should parse");
        assert_eq!(parsed, ParsedClientMessage::Attack);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let result = parse_client_message(r#"{"type":"teleport"}"#);
        assert_eq!(result, Err("unknown message type: teleport".to_string()));
    }

    #[test]
    fn non_object_message_is_rejected() {
        assert!(parse_client_message("[1,2,3]").is_err());
        assert!(parse_client_message("not json").is_err());
    }
}
