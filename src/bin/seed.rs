use std::path::PathBuf;

use clap::Parser;
use log::info;
use mmo_world_rust_server::constants::{base_stats, DEFAULT_MAP};
use mmo_world_rust_server::store::{AccountRecord, CharacterRecord, MonsterRecord, WorldStore};
use mmo_world_rust_server::types::{CharacterClass, Race};

/// Writes a starter world file so a fresh checkout has something to log
/// into. Account and character management live in the account service;
/// this stands in for them during local development.
#[derive(Parser, Debug)]
#[command(author, version, about = "Write a starter world file for local development")]
struct Cli {
    #[arg(long, default_value = ".data/world.json")]
    data_path: PathBuf,
    /// Overwrite an existing world file.
    #[arg(long)]
    force: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.data_path.exists() {
        if !cli.force {
            eprintln!(
                "refusing to overwrite {}; pass --force to replace it",
                cli.data_path.display()
            );
            std::process::exit(1);
        }
        if let Err(err) = std::fs::remove_file(&cli.data_path) {
            eprintln!("failed to remove {}: {err}", cli.data_path.display());
            std::process::exit(1);
        }
    }

    let mut store = WorldStore::new(cli.data_path.clone());

    store.insert_account(AccountRecord {
        id: 1,
        username: "alice".to_string(),
        password: "wonder".to_string(),
    });
    store.insert_account(AccountRecord {
        id: 2,
        username: "bram".to_string(),
        password: "stone".to_string(),
    });

    store.insert_character(starter_character(
        1,
        1,
        "Aria",
        CharacterClass::Warrior,
        Race::Human,
    ));
    store.insert_character(starter_character(
        2,
        2,
        "Bram",
        CharacterClass::Mage,
        Race::Elf,
    ));

    for (index, (name, level, hp, atk, def, exp)) in [
        ("Gray Wolf", 2, 30, 8, 3, 120),
        ("Gray Wolf", 2, 30, 8, 3, 120),
        ("Goblin Scout", 3, 45, 11, 5, 180),
        ("Goblin Scout", 3, 45, 11, 5, 180),
        ("Orc Grunt", 5, 90, 16, 9, 420),
    ]
    .into_iter()
    .enumerate()
    {
        let id = index as i64 + 1;
        store.insert_monster(MonsterRecord {
            id,
            name: name.to_string(),
            map: DEFAULT_MAP.to_string(),
            level,
            hp,
            max_hp: hp,
            atk,
            def,
            exp,
            pos_x: 8.0 + index as f32 * 4.0,
            pos_y: 0.0,
            pos_z: 10.0 + (index % 2) as f32 * 6.0,
            downed_at_ms: None,
        });
    }

    info!(
        "seeded {} with {} accounts and {} monsters",
        cli.data_path.display(),
        store.account_count(),
        store.monster_count()
    );
    println!("world written to {}", cli.data_path.display());
}

fn starter_character(
    id: i64,
    account_id: i64,
    name: &str,
    class: CharacterClass,
    race: Race,
) -> CharacterRecord {
    let stats = base_stats(class, race);
    CharacterRecord {
        id,
        account_id,
        name: name.to_string(),
        class,
        race,
        level: 1,
        exp: 0,
        str: stats.str,
        dex: stats.dex,
        vit: stats.vit,
        int: stats.int,
        luk: stats.luk,
        hp: stats.hp,
        max_hp: stats.hp,
        mp: stats.mp,
        max_mp: stats.mp,
        pos_x: 2.0,
        pos_y: 1.0,
        pos_z: 2.0,
        map: DEFAULT_MAP.to_string(),
        last_played: None,
    }
}
