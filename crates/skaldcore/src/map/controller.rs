//! 地圖控制器
//!
//! 接收 `Room.Info`，更新房間圖、重新配置版面，並產生繪製清單。
//! 繪製本身由前端負責，這裡只決定要畫什麼：
//! - 兩端都有座標的連線直接相連
//! - 邊界連線只有一端有座標時，往出口方向畫一格長的箭頭
//! - 兩端都沒有座標的連線不畫

use tracing::debug;

use super::direction::Direction;
use super::graph::{Door, GraphError, Layout, RoomGraph};
use super::room::RoomInfo;

/// 格子範圍（含邊界）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Viewport {
    /// 以 `center` 為中心、半徑 `radius` 格的範圍
    pub fn around(center: (i32, i32), radius: i32) -> Self {
        let radius = radius.max(0);
        Self {
            min_x: center.0 - radius,
            min_y: center.1 - radius,
            max_x: center.0 + radius,
            max_y: center.1 + radius,
        }
    }

    /// 是否在範圍內（外加一格邊距）
    pub fn contains(&self, (x, y): (i32, i32)) -> bool {
        (self.min_x - 1..=self.max_x + 1).contains(&x) && (self.min_y - 1..=self.max_y + 1).contains(&y)
    }
}

/// 要繪製的房間
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRoom {
    pub id: String,
    pub short: String,
    pub terrain: i32,
    pub pos: (i32, i32),
    /// in/out/up/down 標記
    pub tags: Vec<String>,
}

/// 要繪製的連線
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connector {
    /// 兩端都有座標
    Direct {
        a: String,
        b: String,
        door: Door,
        border: bool,
        exit_kind: Option<i32>,
    },
    /// 通往目前畫面外的邊界出口
    Projected {
        anchor: String,
        far: String,
        from: (i32, i32),
        to: (i32, i32),
        door: Door,
        exit_kind: Option<i32>,
    },
}

/// 一次繪製所需的全部資料
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawList {
    pub current: Option<String>,
    /// 上一步移動方向的數字鍵盤代碼
    pub move_code: Option<u8>,
    pub rooms: Vec<DrawRoom>,
    pub connectors: Vec<Connector>,
}

/// 依版面配置分類連線
pub fn classify_edges(graph: &RoomGraph, layout: &Layout) -> Vec<Connector> {
    let mut connectors = Vec::new();

    for (a, b, edge) in graph.edges() {
        if a == b {
            continue;
        }

        match (layout.position(a), layout.position(b)) {
            (Some(_), Some(_)) => connectors.push(Connector::Direct {
                a: a.to_string(),
                b: b.to_string(),
                door: edge.door,
                border: edge.border,
                exit_kind: edge.exit_kind,
            }),
            (Some(from), None) | (None, Some(from)) if edge.border => {
                let (anchor, far) = if layout.contains(a) { (a, b) } else { (b, a) };
                let dir = graph
                    .room(anchor)
                    .and_then(|room| room.links.direction_to(far))
                    .and_then(Direction::parse_exit)
                    .unwrap_or(Direction::North);
                let (dx, dy) = dir.delta();

                connectors.push(Connector::Projected {
                    anchor: anchor.to_string(),
                    far: far.to_string(),
                    from,
                    to: (from.0 + dx, from.1 + dy),
                    door: edge.door,
                    exit_kind: edge.exit_kind,
                });
            }
            _ => {}
        }
    }

    connectors
}

/// 房間進入時的結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapUpdate {
    pub room: String,
    pub move_code: Option<u8>,
}

/// 地圖控制器
#[derive(Debug, Default)]
pub struct MapController {
    graph: RoomGraph,
    current: Option<String>,
    move_code: Option<u8>,
    layout: Layout,
    viewport: Option<Viewport>,
}

impl MapController {
    pub fn new(graph: RoomGraph) -> Self {
        Self {
            graph,
            ..Self::default()
        }
    }

    pub fn graph(&self) -> &RoomGraph {
        &self.graph
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// 限制繪製範圍（相對於目前房間的格子座標）
    pub fn set_viewport(&mut self, viewport: Option<Viewport>) {
        self.viewport = viewport;
    }

    /// 處理 `Room.Info`
    ///
    /// 移動方向取自更新前上一個房間的出口
    pub fn on_room_info(&mut self, info: &RoomInfo) -> Option<MapUpdate> {
        if info.id.is_empty() {
            return None;
        }

        let move_code = self
            .current
            .as_deref()
            .and_then(|prev| self.graph.room(prev))
            .and_then(|room| room.links.direction_to(&info.id))
            .and_then(Direction::parse_exit)
            .map(|dir| dir.keypad());

        self.graph.upsert(info, &info.exits);
        self.current = Some(info.id.clone());
        self.move_code = move_code;
        self.refresh();

        debug!("目前房間: {} (移動代碼 {:?})", info.id, move_code);
        Some(MapUpdate {
            room: info.id.clone(),
            move_code,
        })
    }

    /// 直接切換目前房間（不更新房間圖）
    pub fn set_current(&mut self, id: &str) -> Result<(), GraphError> {
        if !self.graph.contains(id) {
            return Err(GraphError::UnknownRoom(id.to_string()));
        }
        self.current = Some(id.to_string());
        self.move_code = None;
        self.refresh();
        Ok(())
    }

    /// 設定邊界並重新配置
    pub fn set_border(&mut self, a: &str, b: &str, border: bool) -> Result<(), GraphError> {
        self.graph.set_border(a, b, border)?;
        self.refresh();
        Ok(())
    }

    /// 刪除房間並重新配置；刪除目前房間時清除目前位置
    pub fn remove_room(&mut self, id: &str) -> bool {
        if self.graph.remove_room(id).is_none() {
            return false;
        }
        if self.current.as_deref() == Some(id) {
            self.current = None;
            self.move_code = None;
        }
        self.refresh();
        true
    }

    /// 以目前房間重新配置
    pub fn refresh(&mut self) {
        self.layout = match self.current.as_deref() {
            Some(root) => self.graph.relayout(root).unwrap_or_default(),
            None => Layout::default(),
        };
    }

    /// 產生繪製清單
    pub fn draw_list(&self) -> DrawList {
        let visible = |pos: (i32, i32)| self.viewport.map_or(true, |v| v.contains(pos));

        let rooms: Vec<DrawRoom> = self
            .layout
            .iter()
            .filter(|(_, pos)| visible(*pos))
            .filter_map(|(id, pos)| {
                let room = self.graph.room(id)?;
                Some(DrawRoom {
                    id: id.to_string(),
                    short: room.short.clone(),
                    terrain: room.terrain,
                    pos,
                    tags: room.non_positional_exits(),
                })
            })
            .collect();

        let shown = |id: &str| rooms.iter().any(|r| r.id == id);
        let connectors = classify_edges(&self.graph, &self.layout)
            .into_iter()
            .filter(|c| match c {
                Connector::Direct { a, b, .. } => shown(a) && shown(b),
                Connector::Projected { anchor, .. } => shown(anchor),
            })
            .collect();

        DrawList {
            current: self.current.clone(),
            move_code: self.move_code,
            rooms,
            connectors,
        }
    }

    /// 取出房間圖（保存用）
    pub fn into_graph(self) -> RoomGraph {
        self.graph
    }
}
