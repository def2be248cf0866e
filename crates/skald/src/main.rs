//! Skald 終端機 MUD 客戶端

mod config;
mod connect;
mod map_view;
mod schedule;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use skaldcore::map::{MapController, RoomGraph, Viewport};
use skaldcore::rules::{RuleCategory, RuleRecord, RuleStore};
use skaldcore::script::ScriptEngine;
use skaldcore::RuleEngine;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Profile, ProfileStore};

#[derive(Debug, Parser)]
#[command(name = "skald", version, about = "終端機 MUD 客戶端")]
struct Cli {
    /// Profile 目錄（預設為系統設定目錄下的 skald/profiles）
    #[arg(long, global = true)]
    profiles: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 連線到 Profile 的伺服器
    Connect {
        profile: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// 管理 Profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// 管理規則
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// 地圖
    Map {
        #[command(subcommand)]
        action: MapAction,
    },
}

#[derive(Debug, Subcommand)]
enum ProfileAction {
    List,
    Create {
        name: String,
        host: String,
        port: u16,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long, default_value = "utf-8")]
        encoding: String,
    },
}

#[derive(Debug, Subcommand)]
enum RuleAction {
    List {
        profile: String,
        /// trigger / alias / timer / on_<event>
        #[arg(long)]
        category: Option<RuleCategory>,
    },
    Add {
        profile: String,
        name: String,
        category: RuleCategory,
        #[arg(long)]
        pattern: Option<String>,
        /// Lua 程式碼，或 `--template` 時的送出範本
        #[arg(long, default_value = "")]
        code: String,
        #[arg(long)]
        template: bool,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long)]
        gag: bool,
    },
    Toggle {
        profile: String,
        name: String,
    },
    Delete {
        profile: String,
        name: String,
    },
}

#[derive(Debug, Subcommand)]
enum MapAction {
    Show {
        profile: String,
        #[arg(long)]
        root: Option<String>,
        #[arg(long, default_value_t = 5)]
        radius: i32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 日誌寫到 stderr，避免與遊戲文字混在一起
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let store = match cli.profiles {
        Some(dir) => ProfileStore::new(dir),
        None => ProfileStore::default_location(),
    };

    match cli.command {
        Command::Connect { profile, host, port } => {
            let mut profile = store.load(&profile)?;
            if let Some(host) = host {
                profile.host = host;
            }
            if let Some(port) = port {
                profile.port = port;
            }
            connect::run(&store, &profile).await
        }
        Command::Profile { action } => profile_command(&store, action),
        Command::Rule { action } => rule_command(&store, action),
        Command::Map { action } => map_command(&store, action),
    }
}

fn profile_command(store: &ProfileStore, action: ProfileAction) -> Result<()> {
    match action {
        ProfileAction::List => {
            for profile in store.list()? {
                println!(
                    "{}\t{}\t{}:{}\t{}",
                    profile.name,
                    profile.display_name,
                    profile.host,
                    profile.port,
                    profile.session.encoding
                );
            }
        }
        ProfileAction::Create {
            name,
            host,
            port,
            display_name,
            encoding,
        } => {
            if store.exists(&name) {
                bail!("Profile '{}' 已存在", name);
            }
            let profile = Profile::new(&name, &host, port)
                .with_display_name(display_name.as_deref().unwrap_or(&name))
                .with_encoding(&encoding);
            store.save(&profile)?;
            println!("已建立 Profile '{}'", name);
        }
    }
    Ok(())
}

fn rule_command(store: &ProfileStore, action: RuleAction) -> Result<()> {
    match action {
        RuleAction::List { profile, category } => {
            let rules = load_rules(store, &profile)?;
            for record in rules.list(category.as_ref()) {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    if record.enabled { "on" } else { "off" },
                    record.priority,
                    record.category,
                    record.name,
                    record.pattern.as_deref().unwrap_or("")
                );
            }
        }
        RuleAction::Add {
            profile,
            name,
            category,
            pattern,
            code,
            template,
            interval_ms,
            priority,
            gag,
        } => {
            let mut rules = load_rules(store, &profile)?;
            let mut record = RuleRecord::new(&name, category, code)
                .with_priority(priority)
                .with_gag(gag);
            if let Some(pattern) = pattern {
                record = record.with_pattern(pattern);
            }
            if let Some(interval) = interval_ms {
                record = record.with_interval_ms(interval);
            }
            if template {
                record = record.as_template();
            }

            // 先編譯一次，無效的規則不寫入
            RuleEngine::new(std::rc::Rc::new(ScriptEngine::new())).compile(&record)?;

            rules.create(record)?;
            rules.save(&store.rules_path(&profile))?;
            println!("已新增規則 '{}'", name);
        }
        RuleAction::Toggle { profile, name } => {
            let mut rules = load_rules(store, &profile)?;
            let enabled = rules
                .toggle(&name)
                .with_context(|| format!("找不到規則 '{}'", name))?;
            rules.save(&store.rules_path(&profile))?;
            println!("規則 '{}' {}", name, if enabled { "已啟用" } else { "已停用" });
        }
        RuleAction::Delete { profile, name } => {
            let mut rules = load_rules(store, &profile)?;
            rules
                .delete(&name)
                .with_context(|| format!("找不到規則 '{}'", name))?;
            rules.save(&store.rules_path(&profile))?;
            println!("已刪除規則 '{}'", name);
        }
    }
    Ok(())
}

fn load_rules(store: &ProfileStore, profile: &str) -> Result<RuleStore> {
    if !store.exists(profile) {
        bail!("找不到 Profile '{}'", profile);
    }
    RuleStore::load(&store.rules_path(profile))
        .with_context(|| format!("無法載入 '{}' 的規則", profile))
}

fn map_command(store: &ProfileStore, action: MapAction) -> Result<()> {
    match action {
        MapAction::Show {
            profile,
            root,
            radius,
        } => {
            let graph = RoomGraph::load(&store.map_path(&profile))
                .with_context(|| format!("無法載入 '{}' 的地圖", profile))?;
            let root = match root.or_else(|| graph.rooms().next().map(|r| r.id.clone())) {
                Some(root) => root,
                None => {
                    println!("地圖是空的");
                    return Ok(());
                }
            };

            let mut map = MapController::new(graph);
            map.set_current(&root)?;
            map.set_viewport(Some(Viewport::around((0, 0), radius)));

            if let Some(summary) = map_view::describe(&map) {
                println!("{}", summary);
            }
            if let Some(text) = map_view::render(&map.draw_list()) {
                println!("{}", text);
            }
        }
    }
    Ok(())
}
