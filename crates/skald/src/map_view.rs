//! 以 ASCII 字元繪製地圖
//!
//! 房間放在偶數格，連線畫在兩個房間之間的奇數格：
//!
//! ```text
//! o-@
//! | |
//! o o
//! ```

use std::collections::HashMap;

use skaldcore::map::{terrain_name, Connector, Door, DrawList, DrawRoom, MapController};

/// 把繪製清單轉成多行文字，沒有房間時回傳 `None`
pub fn render(draw: &DrawList) -> Option<String> {
    let positions: HashMap<&str, (i32, i32)> =
        draw.rooms.iter().map(|r| (r.id.as_str(), r.pos)).collect();

    let mut cells: Vec<((i32, i32), char)> = Vec::new();

    for connector in &draw.connectors {
        match connector {
            Connector::Direct { a, b, door, border, .. } => {
                let (Some(&pa), Some(&pb)) = (positions.get(a.as_str()), positions.get(b.as_str())) else {
                    continue;
                };
                let Some(glyph) = link_glyph(pa, pb) else {
                    continue;
                };
                let glyph = if *border { '#' } else { door_glyph(*door).unwrap_or(glyph) };
                cells.push((midpoint(pa, pb), glyph));
            }
            Connector::Projected { from, to, .. } => {
                if let Some(glyph) = link_glyph(*from, *to) {
                    cells.push((midpoint(*from, *to), glyph));
                    cells.push(((to.0 * 2, to.1 * 2), '>'));
                }
            }
        }
    }

    for room in &draw.rooms {
        let current = draw.current.as_deref() == Some(room.id.as_str());
        cells.push(((room.pos.0 * 2, room.pos.1 * 2), room_glyph(room, current)));
    }

    let min_x = cells.iter().map(|((x, _), _)| *x).min()?;
    let max_x = cells.iter().map(|((x, _), _)| *x).max()?;
    let min_y = cells.iter().map(|((_, y), _)| *y).min()?;
    let max_y = cells.iter().map(|((_, y), _)| *y).max()?;

    let width = (max_x - min_x + 1) as usize;
    let height = (max_y - min_y + 1) as usize;
    let mut grid = vec![vec![' '; width]; height];
    for ((x, y), glyph) in cells {
        grid[(y - min_y) as usize][(x - min_x) as usize] = glyph;
    }

    let lines: Vec<String> = grid
        .into_iter()
        .map(|row| row.into_iter().collect::<String>().trim_end().to_string())
        .collect();
    Some(lines.join("\n"))
}

/// 目前房間與版面範圍的摘要，例如 `R1 廣場 [meadow]，3 個房間 (0,-1)..(1,1)`
pub fn describe(map: &MapController) -> Option<String> {
    let room = map.graph().room(map.current()?)?;
    let terrain = terrain_name(room.terrain).unwrap_or("unknown");
    let mut text = format!("{} {} [{}]", room.id, room.short, terrain);

    let layout = map.layout();
    if let Some((x0, y0, x1, y1)) = layout.bounds() {
        text.push_str(&format!("，{} 個房間 ({},{})..({},{})", layout.len(), x0, y0, x1, y1));
    }
    Some(text)
}

/// 房間符號：`@` 目前位置、`?` 未探索、`*` 有 in/out/up/down 出口
fn room_glyph(room: &DrawRoom, current: bool) -> char {
    if current {
        '@'
    } else if room.terrain < 0 {
        '?'
    } else if !room.tags.is_empty() {
        '*'
    } else {
        'o'
    }
}

/// 相鄰房間之間的連線符號，不相鄰時回傳 `None`
fn link_glyph(a: (i32, i32), b: (i32, i32)) -> Option<char> {
    let glyph = match (b.0 - a.0, b.1 - a.1) {
        (0, -1) | (0, 1) => '|',
        (-1, 0) | (1, 0) => '-',
        (1, -1) | (-1, 1) => '/',
        (1, 1) | (-1, -1) => '\\',
        _ => return None,
    };
    Some(glyph)
}

fn door_glyph(door: Door) -> Option<char> {
    match door {
        Door::None => None,
        Door::Open => Some('\''),
        Door::Closed => Some('+'),
    }
}

fn midpoint(a: (i32, i32), b: (i32, i32)) -> (i32, i32) {
    (a.0 + b.0, a.1 + b.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skaldcore::map::{MapController, RoomInfo, DOOR_CLOSED};

    fn controller() -> MapController {
        let mut map = MapController::default();
        map.on_room_info(
            &RoomInfo::new("A")
                .with_short("廣場")
                .with_terrain(7)
                .with_link("east", "B")
                .with_link("south", "C")
                .with_exit("south", DOOR_CLOSED),
        );
        map.on_room_info(&RoomInfo::new("B").with_terrain(7).with_link("west", "A"));
        map.set_current("A").unwrap();
        map
    }

    #[test]
    fn test_render_small_map() {
        let map = controller();
        let text = render(&map.draw_list()).unwrap();
        assert_eq!(text, "@-o\n+\n?");
    }

    #[test]
    fn test_describe_current_room() {
        let map = controller();
        assert_eq!(
            describe(&map).as_deref(),
            Some("A 廣場 [meadow]，3 個房間 (0,0)..(1,1)")
        );
        assert_eq!(describe(&MapController::default()), None);
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&DrawList::default()), None);
    }

    #[test]
    fn test_link_glyphs() {
        assert_eq!(link_glyph((0, 0), (1, 1)), Some('\\'));
        assert_eq!(link_glyph((0, 0), (1, -1)), Some('/'));
        assert_eq!(link_glyph((0, 0), (2, 0)), None);
    }
}
