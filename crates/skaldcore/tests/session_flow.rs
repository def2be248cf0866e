//! Session 端對端測試：位元組進，顯示與送出資料出

use std::rc::Rc;
use std::time::Instant;

use skaldcore::map::{Connector, MapController, RoomGraph};
use skaldcore::rules::{RuleCategory, RuleEngine, RuleRecord};
use skaldcore::script::ScriptEngine;
use skaldcore::session::{DisplayLine, Session, SessionConfig};
use skaldcore::telnet::{encode_gmcp, TelnetCommand, IAC};

fn session_with(records: &[RuleRecord]) -> Session {
    let mut engine = RuleEngine::new(Rc::new(ScriptEngine::new()));
    let errors = engine.load(records, Instant::now());
    assert!(errors.is_empty(), "{:?}", errors);
    Session::new(SessionConfig::default(), engine, MapController::new(RoomGraph::new()))
}

fn room_info(json: &str) -> Vec<u8> {
    encode_gmcp("Room.Info", Some(json))
}

#[test]
fn room_info_overlap_keeps_one_room_north() {
    let mut session = session_with(&[]);

    let out = session.receive(&room_info(
        r#"{"id":"R1","short":"A road","type":7,"links":{"north":"R2","northup":"R3"},"exits":{}}"#,
    ));
    assert!(out.map_changed);

    let layout = session.map().layout();
    assert_eq!(layout.position("R1"), Some((0, 0)));

    let north: Vec<&str> = ["R2", "R3"]
        .into_iter()
        .filter(|id| layout.position(id) == Some((0, -1)))
        .collect();
    assert_eq!(north.len(), 1, "只能有一個房間放在北方: {:?}", north);
    assert_eq!(layout.len(), 2);

    // 兩條邊都存在於房間圖
    let graph = session.map().graph();
    assert!(graph.edge("R1", "R2").is_some());
    assert!(graph.edge("R1", "R3").is_some());
}

#[test]
fn walking_north_reports_keypad_and_draws_connectors() {
    let mut session = session_with(&[]);

    session.receive(&room_info(r#"{"id":"A","type":7,"links":{"north":"B"}}"#));
    let out = session.receive(&room_info(r#"{"id":"B","type":8,"links":{"south":"A","east":"C"}}"#));

    let update = out.room.expect("room update");
    assert_eq!(update.room, "B");
    assert_eq!(update.move_code, Some(8));

    let draw = session.map().draw_list();
    assert_eq!(draw.current.as_deref(), Some("B"));
    let ids: Vec<&str> = draw.rooms.iter().map(|r| r.id.as_str()).collect();
    assert!(ids.contains(&"A") && ids.contains(&"C"));
    assert!(draw
        .connectors
        .iter()
        .any(|c| matches!(c, Connector::Direct { a, b, .. } if (a == "A" && b == "B") || (a == "B" && b == "A"))));
}

#[test]
fn gag_and_template_trigger_over_the_wire() {
    let records = [
        RuleRecord::new("quiet", RuleCategory::Trigger, "")
            .with_pattern("^You are hungry")
            .with_gag(true)
            .with_priority(10)
            .as_template(),
        RuleRecord::new("loot", RuleCategory::Trigger, "get all from corpse")
            .with_pattern(r"^(\w+) is dead!")
            .as_template(),
    ];
    let mut session = session_with(&records);

    let mut display = Vec::new();
    let mut outbound = Vec::new();
    for chunk in [&b"You are hun"[..], b"gry.\r\nThe rat is dead", b"!\r\n"] {
        let out = session.receive(chunk);
        display.extend(out.display);
        outbound.extend(out.outbound);
    }

    assert_eq!(display, vec![DisplayLine::Plain("The rat is dead!".into())]);
    assert!(outbound.is_empty());

    let out = session.receive(b"rat is dead!\n");
    assert_eq!(out.outbound, vec![b"get all from corpse\r\n".to_vec()]);
}

#[test]
fn login_prompt_terminated_by_go_ahead_fires_trigger() {
    let records = [
        RuleRecord::new("name", RuleCategory::Trigger, "hero")
            .with_pattern("^What is your name")
            .as_template(),
        RuleRecord::new("status", RuleCategory::Trigger, "")
            .with_pattern(r"^<\d+hp>")
            .with_gag(true)
            .as_template(),
    ];
    let mut session = session_with(&records);

    let mut wire = b"Welcome!\r\nWhat is your name? ".to_vec();
    wire.extend_from_slice(&[IAC, TelnetCommand::GoAhead as u8]);
    let out = session.receive(&wire);

    assert_eq!(
        out.display,
        vec![
            DisplayLine::Plain("Welcome!".into()),
            DisplayLine::Prompt("What is your name? ".into()),
        ]
    );
    assert_eq!(out.outbound, vec![b"hero\r\n".to_vec()]);

    // 被隱藏的提示字元不顯示
    let out = session.receive(&[b'<', b'9', b'9', b'h', b'p', b'>', b' ', IAC, TelnetCommand::GoAhead as u8]);
    assert!(out.display.is_empty());
    assert!(out.outbound.is_empty());
}

#[test]
fn alias_chain_through_session_input() {
    let records = [
        RuleRecord::new("k", RuleCategory::Alias, "kk {1}")
            .with_pattern(r"^k (\w+)$")
            .as_template(),
        RuleRecord::new("kk", RuleCategory::Alias, "kill {1}")
            .with_pattern(r"^kk (\w+)$")
            .as_template(),
    ];
    let mut session = session_with(&records);

    let out = session.input("k goblin");
    assert_eq!(out.outbound, vec![b"kill goblin\r\n".to_vec()]);
}

#[test]
fn password_prompt_masks_input() {
    let mut session = session_with(&[]);

    let mut bytes = b"Password: ".to_vec();
    bytes.extend_from_slice(&[IAC, TelnetCommand::Will as u8, 1]);
    bytes.extend_from_slice(&[IAC, TelnetCommand::GoAhead as u8]);

    let out = session.receive(&bytes);
    assert_eq!(out.echo_masked, Some(true));
    assert_eq!(out.display, vec![DisplayLine::Prompt("Password: ".into())]);
    assert_eq!(out.outbound, vec![vec![IAC, TelnetCommand::Do as u8, 1]]);

    let out = session.receive(&[IAC, TelnetCommand::Wont as u8, 1]);
    assert_eq!(out.echo_masked, Some(false));
}

#[test]
fn script_trigger_reads_gmcp_and_sends() {
    let records = [RuleRecord::new(
        "flee",
        RuleCategory::Trigger,
        r#"if gmcp["Char.Vitals"].hp < 20 then send("flee") else echo("fight on") end"#,
    )
    .with_pattern("attacks you")];
    let mut session = session_with(&records);

    session.receive(&encode_gmcp("Char.Vitals", Some(r#"{"hp":10}"#)));
    let out = session.receive(b"The troll attacks you!\n");
    assert_eq!(out.outbound, vec![b"flee\r\n".to_vec()]);

    session.receive(&encode_gmcp("Char.Vitals", Some(r#"{"hp":90}"#)));
    let out = session.receive(b"The troll attacks you!\n");
    assert!(out.outbound.is_empty());
    assert_eq!(out.display.last(), Some(&DisplayLine::Echo("fight on".into())));
}

#[test]
fn rule_edit_applies_without_reload() {
    let mut session = session_with(&[]);
    assert!(session.receive(b"ping\n").outbound.is_empty());

    let record = RuleRecord::new("pong", RuleCategory::Trigger, "pong")
        .with_pattern("^ping$")
        .as_template();
    session
        .engine_mut()
        .apply(&record, Instant::now())
        .expect("valid rule");
    assert_eq!(session.receive(b"ping\n").outbound, vec![b"pong\r\n".to_vec()]);

    session
        .engine_mut()
        .apply(&record.clone().with_enabled(false), Instant::now())
        .expect("disable");
    assert!(session.receive(b"ping\n").outbound.is_empty());
}
