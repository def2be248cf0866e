//! 連線主迴圈
//!
//! Lua 狀態不能跨執行緒，所以 Session 留在主任務上，
//! 以 `tokio::select!` 同時等待伺服器資料、鍵盤輸入與 Ctrl-C，
//! 計時器、閒置提示字元和地圖存檔的期限由 [`LoopSchedule`] 計算。

use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use skaldcore::map::{MapController, RoomGraph, Viewport};
use skaldcore::rules::{RuleEngine, RuleStore};
use skaldcore::script::ScriptEngine;
use skaldcore::telnet::{TelnetClient, TelnetConfig};
use skaldcore::{DisplayLine, Session, SessionOutput};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{debug, info, warn};

use crate::config::{Profile, ProfileStore};
use crate::map_view;
use crate::schedule::{sleep_until, LoopSchedule};

/// 本地命令前綴
const LOCAL_PREFIX: char = '#';

/// 建立 Session：載入規則與地圖
pub fn build_session(store: &ProfileStore, profile: &Profile) -> Result<Session> {
    let rules = RuleStore::load(&store.rules_path(&profile.name))
        .with_context(|| format!("無法載入 '{}' 的規則", profile.name))?;
    let graph = RoomGraph::load(&store.map_path(&profile.name))
        .with_context(|| format!("無法載入 '{}' 的地圖", profile.name))?;
    info!("已載入 {} 條規則、{} 個房間", rules.len(), graph.len());

    let mut engine = RuleEngine::new(Rc::new(ScriptEngine::new()));
    for error in engine.load(rules.records(), Instant::now()) {
        warn!("規則 '{}' 未載入: {}", error.rule_name(), error);
    }

    Ok(Session::new(
        profile.session.clone(),
        engine,
        MapController::new(graph),
    ))
}

/// 連線並執行到斷線為止
pub async fn run(store: &ProfileStore, profile: &Profile) -> Result<()> {
    let mut session = build_session(store, profile)?;
    session.map_mut().set_viewport(Some(Viewport::around((0, 0), 6)));

    let mut client = TelnetClient::new(TelnetConfig::default());
    client
        .connect(&profile.host, profile.port)
        .await
        .with_context(|| format!("無法連線到 {}:{}", profile.host, profile.port))?;

    let mut stdout = tokio::io::stdout();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut schedule = LoopSchedule::new(
        Duration::from_millis(profile.prompt_idle_ms),
        Duration::from_millis(profile.timer_resolution_ms.max(10)),
        Instant::now(),
    );

    write_line(&mut stdout, &format!(">>> 已連線到 {}:{}", profile.host, profile.port)).await?;
    deliver(&mut client, &mut stdout, session.connected()).await?;

    loop {
        let timer_deadline = schedule.timer_deadline(session.engine().timers().next_due());

        tokio::select! {
            chunk = client.read_chunk() => match chunk {
                Ok(bytes) => {
                    let out = session.receive(&bytes);
                    let now = Instant::now();
                    schedule.on_receive(now, session.has_partial());
                    if out.map_changed {
                        schedule.on_map_changed(now);
                    }
                    deliver(&mut client, &mut stdout, out).await?;
                }
                Err(e) => {
                    info!("連線結束: {}", e);
                    break;
                }
            },
            line = stdin.next_line() => match line.context("無法讀取輸入")? {
                Some(line) => {
                    if let Some(command) = line.strip_prefix(LOCAL_PREFIX) {
                        if !local_command(command.trim(), &session, &mut stdout).await? {
                            break;
                        }
                        continue;
                    }
                    deliver(&mut client, &mut stdout, session.input(&line)).await?;
                }
                None => break,
            },
            _ = sleep_until(timer_deadline) => {
                let now = Instant::now();
                schedule.on_tick(now);
                let out = session.tick(now);
                if !out.is_empty() {
                    deliver(&mut client, &mut stdout, out).await?;
                }
            }
            _ = sleep_until(schedule.prompt_deadline()) => {
                if schedule.take_prompt(Instant::now()) {
                    deliver(&mut client, &mut stdout, session.flush_prompt()).await?;
                }
            }
            _ = sleep_until(schedule.save_deadline()) => {
                if schedule.take_save(Instant::now()) {
                    if let Err(e) = save_map(store, profile, &session) {
                        warn!("{:#}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("收到 Ctrl-C");
                break;
            }
        }
    }

    let out = session.disconnected();
    print_display(&mut stdout, &out.display).await?;
    client.disconnect().await;
    write_line(&mut stdout, ">>> 連線已關閉").await?;

    save_map(store, profile, &session)
}

/// 把目前的房間圖寫回 Profile 目錄
fn save_map(store: &ProfileStore, profile: &Profile, session: &Session) -> Result<()> {
    let map_path = store.map_path(&profile.name);
    session
        .map()
        .graph()
        .save(&map_path)
        .with_context(|| format!("無法儲存地圖 {}", map_path.display()))?;
    debug!("地圖已儲存: {}", map_path.display());
    Ok(())
}

/// 處理本地命令，回傳 `false` 代表結束連線
async fn local_command(command: &str, session: &Session, stdout: &mut Stdout) -> Result<bool> {
    match command {
        "quit" => return Ok(false),
        "map" => match map_view::render(&session.map().draw_list()) {
            Some(text) => {
                if let Some(summary) = map_view::describe(session.map()) {
                    write_line(stdout, &format!(">>> {}", summary)).await?;
                }
                write_line(stdout, &text).await?;
            }
            None => write_line(stdout, ">>> 地圖是空的").await?,
        },
        other => write_line(stdout, &format!(">>> 未知的本地命令: #{}", other)).await?,
    }
    Ok(true)
}

/// 顯示 Session 的輸出並把資料送往伺服器
async fn deliver(client: &mut TelnetClient, stdout: &mut Stdout, out: SessionOutput) -> Result<()> {
    print_display(stdout, &out.display).await?;

    if let Some(masked) = out.echo_masked {
        info!("輸入遮蔽: {}", masked);
    }

    for bytes in &out.outbound {
        if let Err(e) = client.send_raw(bytes).await {
            warn!("送出失敗: {}", e);
        }
    }
    Ok(())
}

async fn print_display(stdout: &mut Stdout, lines: &[DisplayLine]) -> Result<()> {
    for line in lines {
        match line {
            DisplayLine::Plain(text) | DisplayLine::Echo(text) => {
                stdout.write_all(text.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            DisplayLine::Formatted(markup) => {
                stdout.write_all(strip_markup(markup).as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            DisplayLine::Prompt(text) => stdout.write_all(text.as_bytes()).await?,
        }
    }
    stdout.flush().await?;
    Ok(())
}

async fn write_line(stdout: &mut Stdout, text: &str) -> Result<()> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// 去掉 HTML 標記，只保留文字
fn strip_markup(markup: &str) -> String {
    let mut text = String::with_capacity(markup.len());
    let mut in_tag = false;
    for c in markup.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
