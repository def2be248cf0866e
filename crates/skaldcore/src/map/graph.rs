//! 房間圖
//!
//! 房間以 ID 為鍵存放，連線為無向邊。版面配置從目前房間做廣度優先搜尋，
//! 每個格子只會有一個房間，後來者被略過。

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::direction::Direction;
use super::room::{Room, RoomInfo};

/// 出口代碼：門已開啟
pub const DOOR_OPEN: i32 = 100;
/// 出口代碼：門已關閉
pub const DOOR_CLOSED: i32 = -100;

/// 房間圖操作錯誤
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("找不到房間: {0}")]
    UnknownRoom(String),

    #[error("房間 {0} 與 {1} 之間沒有連線")]
    UnknownEdge(String, String),
}

/// 地圖存取錯誤
#[derive(Debug, Error)]
pub enum MapStoreError {
    #[error("讀寫地圖檔失敗: {0}")]
    Io(#[from] io::Error),

    #[error("地圖檔格式錯誤: {0}")]
    Json(#[from] serde_json::Error),
}

/// 門的狀態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Door {
    #[default]
    None,
    Open,
    Closed,
}

impl Door {
    /// 從出口代碼解析，非門的代碼回傳 `None`
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            DOOR_OPEN => Some(Self::Open),
            DOOR_CLOSED => Some(Self::Closed),
            _ => None,
        }
    }
}

/// 連線屬性
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// 版面配置不會穿過邊界
    #[serde(default)]
    pub border: bool,
    #[serde(default)]
    pub door: Door,
    /// 非門的出口代碼（道路、小徑等）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_kind: Option<i32>,
}

/// 無向邊的鍵，兩端依字典序排列
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct EdgeKey(String, String);

impl EdgeKey {
    fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }
}

/// 一次版面配置的結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    positions: HashMap<String, (i32, i32)>,
    owners: HashMap<(i32, i32), String>,
    /// 廣度優先的放置順序
    order: Vec<String>,
}

impl Layout {
    fn place(&mut self, id: &str, pos: (i32, i32)) {
        self.positions.insert(id.to_string(), pos);
        self.owners.insert(pos, id.to_string());
        self.order.push(id.to_string());
    }

    pub fn position(&self, id: &str) -> Option<(i32, i32)> {
        self.positions.get(id).copied()
    }

    /// 佔據某格子的房間
    pub fn owner(&self, pos: (i32, i32)) -> Option<&str> {
        self.owners.get(&pos).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// 起點房間
    pub fn root(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }

    /// 依放置順序迭代
    pub fn iter(&self) -> impl Iterator<Item = (&str, (i32, i32))> {
        self.order
            .iter()
            .filter_map(|id| self.positions.get(id).map(|pos| (id.as_str(), *pos)))
    }

    /// 範圍 (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> Option<(i32, i32, i32, i32)> {
        let mut iter = self.positions.values();
        let &(x, y) = iter.next()?;
        Some(iter.fold((x, y, x, y), |(x0, y0, x1, y1), &(x, y)| {
            (x0.min(x), y0.min(y), x1.max(x), y1.max(y))
        }))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// 已探索世界的房間圖
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomGraph {
    rooms: BTreeMap<String, Room>,
    edges: BTreeMap<EdgeKey, Edge>,
}

impl RoomGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<&Edge> {
        self.edges.get(&EdgeKey::new(a, b))
    }

    /// 所有連線 (a, b, 屬性)
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &Edge)> {
        self.edges
            .iter()
            .map(|(key, edge)| (key.0.as_str(), key.1.as_str(), edge))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// 以 `Room.Info` 新增或更新房間
    ///
    /// - 缺少的欄位保留舊值
    /// - 鄰居不存在時建立未探索房間
    /// - `exit_types` 中的門代碼會更新門的狀態，其他代碼記為出口種類
    pub fn upsert(&mut self, info: &RoomInfo, exit_types: &HashMap<String, i32>) {
        if info.id.is_empty() {
            debug!("略過沒有 ID 的房間資料");
            return;
        }

        let room = self
            .rooms
            .entry(info.id.clone())
            .or_insert_with(|| Room::stub(&info.id));

        if let Some(short) = info.short.as_ref().filter(|s| !s.is_empty()) {
            room.short = short.clone();
        }
        if let Some(terrain) = info.terrain {
            room.terrain = terrain;
        }

        let Some(links) = info.links.as_ref().filter(|l| !l.is_empty()) else {
            return;
        };
        room.links = links.clone();

        for (direction, neighbor) in links.iter() {
            if neighbor.is_empty() {
                continue;
            }
            if !self.rooms.contains_key(neighbor) {
                debug!("建立未探索房間: {}", neighbor);
                self.rooms.insert(neighbor.to_string(), Room::stub(neighbor));
            }

            let edge = self.edges.entry(EdgeKey::new(&info.id, neighbor)).or_default();
            if let Some(&code) = exit_types.get(direction) {
                match Door::from_code(code) {
                    Some(door) => edge.door = door,
                    None => edge.exit_kind = Some(code),
                }
            }
        }
    }

    /// 連線是否為邊界
    pub fn is_border(&self, a: &str, b: &str) -> Result<bool, GraphError> {
        self.edge(a, b)
            .map(|e| e.border)
            .ok_or_else(|| GraphError::UnknownEdge(a.to_string(), b.to_string()))
    }

    /// 設定邊界
    pub fn set_border(&mut self, a: &str, b: &str, border: bool) -> Result<(), GraphError> {
        let edge = self
            .edges
            .get_mut(&EdgeKey::new(a, b))
            .ok_or_else(|| GraphError::UnknownEdge(a.to_string(), b.to_string()))?;
        edge.border = border;
        info!("連線 {} <-> {} 邊界: {}", a, b, border);
        Ok(())
    }

    /// 刪除房間及其所有連線
    pub fn remove_room(&mut self, id: &str) -> Option<Room> {
        let room = self.rooms.remove(id)?;
        self.edges.retain(|key, _| key.0 != id && key.1 != id);
        info!("已刪除房間: {}", id);
        Some(room)
    }

    /// 從 `root` 開始的廣度優先版面配置，root 位於 (0, 0)
    ///
    /// 不修改房間圖；未知的 root 回傳空結果
    pub fn layout_from_root(&self, root: &str) -> Layout {
        let mut layout = Layout::default();
        if !self.rooms.contains_key(root) {
            return layout;
        }

        layout.place(root, (0, 0));
        let mut queue = VecDeque::from([root.to_string()]);

        while let Some(current) = queue.pop_front() {
            let Some((cx, cy)) = layout.position(&current) else {
                continue;
            };
            let Some(room) = self.rooms.get(&current) else {
                continue;
            };

            for (direction, neighbor) in room.links.iter() {
                if self.edge(&current, neighbor).is_some_and(|e| e.border) {
                    continue;
                }
                if !self.rooms.contains_key(neighbor) {
                    continue;
                }
                let Some(dir) = Direction::parse_exit(direction) else {
                    continue;
                };
                if layout.contains(neighbor) {
                    continue;
                }

                let (dx, dy) = dir.delta();
                let target = (cx + dx, cy + dy);
                if let Some(owner) = layout.owner(target) {
                    debug!("{} 與 {} 重疊於 {:?}，略過", neighbor, owner, target);
                    continue;
                }

                layout.place(neighbor, target);
                queue.push_back(neighbor.to_string());
            }
        }

        layout
    }

    /// 把版面配置結果寫回房間座標
    pub fn apply_layout(&mut self, layout: &Layout) {
        for (id, pos) in layout.iter() {
            if let Some(room) = self.rooms.get_mut(id) {
                room.grid = Some(pos);
            }
        }
    }

    /// 重新配置並寫回座標
    pub fn relayout(&mut self, root: &str) -> Result<Layout, GraphError> {
        if !self.rooms.contains_key(root) {
            return Err(GraphError::UnknownRoom(root.to_string()));
        }
        let layout = self.layout_from_root(root);
        self.apply_layout(&layout);
        Ok(layout)
    }

    /// 從檔案載入，檔案不存在時回傳空地圖
    pub fn load(path: &Path) -> Result<Self, MapStoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let data: MapData = serde_json::from_str(&content)?;
        let graph = Self::from(data);
        info!(
            "已載入地圖: {} 個房間, {} 條連線",
            graph.len(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// 保存到檔案（先寫入暫存檔再改名）
    pub fn save(&self, path: &Path) -> Result<(), MapStoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(&MapData::from(self))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        debug!("已保存地圖: {}", path.display());
        Ok(())
    }
}

/// 地圖檔格式
#[derive(Debug, Serialize, Deserialize)]
struct MapData {
    #[serde(default)]
    rooms: Vec<Room>,
    #[serde(default)]
    edges: Vec<EdgeData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EdgeData {
    a: String,
    b: String,
    #[serde(flatten)]
    edge: Edge,
}

impl From<&RoomGraph> for MapData {
    fn from(graph: &RoomGraph) -> Self {
        Self {
            rooms: graph.rooms.values().cloned().collect(),
            edges: graph
                .edges
                .iter()
                .map(|(key, edge)| EdgeData {
                    a: key.0.clone(),
                    b: key.1.clone(),
                    edge: *edge,
                })
                .collect(),
        }
    }
}

impl From<MapData> for RoomGraph {
    fn from(data: MapData) -> Self {
        Self {
            rooms: data
                .rooms
                .into_iter()
                .map(|room| (room.id.clone(), room))
                .collect(),
            edges: data
                .edges
                .into_iter()
                .map(|e| (EdgeKey::new(&e.a, &e.b), e.edge))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_exits() -> HashMap<String, i32> {
        HashMap::new()
    }

    fn add(graph: &mut RoomGraph, info: RoomInfo) {
        let exits = info.exits.clone();
        graph.upsert(&info, &exits);
    }

    #[test]
    fn test_upsert_creates_stubs_and_edges() {
        let mut graph = RoomGraph::new();
        add(
            &mut graph,
            RoomInfo::new("R1")
                .with_short("A road")
                .with_terrain(7)
                .with_link("north", "R2"),
        );

        assert_eq!(graph.len(), 2);
        assert!(!graph.room("R2").unwrap().is_explored());
        assert_eq!(graph.edge("R2", "R1"), Some(&Edge::default()));
    }

    #[test]
    fn test_upsert_preserves_missing_fields() {
        let mut graph = RoomGraph::new();
        add(
            &mut graph,
            RoomInfo::new("R1")
                .with_short("A road")
                .with_terrain(7)
                .with_link("north", "R2"),
        );
        add(&mut graph, RoomInfo::new("R1").with_short(""));

        let room = graph.room("R1").unwrap();
        assert_eq!(room.short, "A road");
        assert_eq!(room.terrain, 7);
        assert_eq!(room.links.get("north"), Some("R2"));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let info = RoomInfo::new("R1")
            .with_short("Square")
            .with_terrain(11)
            .with_link("east", "R2")
            .with_link("in", "R3")
            .with_exit("east", DOOR_CLOSED)
            .with_exit("in", 5);

        let mut once = RoomGraph::new();
        add(&mut once, info.clone());
        let mut twice = once.clone();
        add(&mut twice, info);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_door_and_exit_kind() {
        let mut graph = RoomGraph::new();
        add(
            &mut graph,
            RoomInfo::new("A")
                .with_link("east", "B")
                .with_link("west", "C")
                .with_exit("east", DOOR_OPEN)
                .with_exit("west", 3),
        );

        assert_eq!(graph.edge("A", "B").unwrap().door, Door::Open);
        assert_eq!(graph.edge("A", "C").unwrap().door, Door::None);
        assert_eq!(graph.edge("A", "C").unwrap().exit_kind, Some(3));

        // 沒有代碼時保留舊狀態
        add(&mut graph, RoomInfo::new("A").with_link("east", "B"));
        assert_eq!(graph.edge("A", "B").unwrap().door, Door::Open);

        // 門代碼一定覆蓋
        add(
            &mut graph,
            RoomInfo::new("A").with_link("east", "B").with_exit("east", DOOR_CLOSED),
        );
        assert_eq!(graph.edge("A", "B").unwrap().door, Door::Closed);
    }

    #[test]
    fn test_border_survives_upsert() {
        let mut graph = RoomGraph::new();
        add(&mut graph, RoomInfo::new("A").with_link("east", "B"));
        graph.set_border("B", "A", true).unwrap();

        add(
            &mut graph,
            RoomInfo::new("A").with_link("east", "B").with_exit("east", DOOR_OPEN),
        );
        assert!(graph.is_border("A", "B").unwrap());
    }

    #[test]
    fn test_unknown_edge() {
        let mut graph = RoomGraph::new();
        assert!(matches!(
            graph.is_border("x", "y"),
            Err(GraphError::UnknownEdge(_, _))
        ));
        assert!(graph.set_border("x", "y", true).is_err());
    }

    #[test]
    fn test_layout_basic() {
        let mut graph = RoomGraph::new();
        add(
            &mut graph,
            RoomInfo::new("C")
                .with_link("north", "N")
                .with_link("southeast", "SE")
                .with_link("up", "U"),
        );

        let layout = graph.layout_from_root("C");
        assert_eq!(layout.position("C"), Some((0, 0)));
        assert_eq!(layout.position("N"), Some((0, -1)));
        assert_eq!(layout.position("SE"), Some((1, 1)));
        assert_eq!(layout.position("U"), None);
        assert_eq!(layout.root(), Some("C"));
        assert_eq!(layout.bounds(), Some((0, -1, 1, 1)));
    }

    #[test]
    fn test_layout_unknown_root() {
        let graph = RoomGraph::new();
        assert!(graph.layout_from_root("nowhere").is_empty());
    }

    #[test]
    fn test_layout_skips_malformed_direction() {
        let mut graph = RoomGraph::new();
        add(&mut graph, RoomInfo::new("A").with_link("portal", "B"));

        let layout = graph.layout_from_root("A");
        assert_eq!(layout.len(), 1);
        assert!(graph.edge("A", "B").is_some());
    }

    #[test]
    fn test_layout_overlap_first_claimant_wins() {
        let mut graph = RoomGraph::new();
        add(
            &mut graph,
            RoomInfo::new("R").with_link("east", "A").with_link("north", "X"),
        );
        add(&mut graph, RoomInfo::new("X").with_link("southeast", "B"));

        let layout = graph.layout_from_root("R");
        assert_eq!(layout.position("A"), Some((1, 0)));
        assert_eq!(layout.owner((1, 0)), Some("A"));
        assert!(!layout.contains("B"));
    }

    #[test]
    fn test_border_blocks_traversal() {
        let mut graph = RoomGraph::new();
        add(&mut graph, RoomInfo::new("R").with_link("west", "N"));
        add(&mut graph, RoomInfo::new("N").with_link("west", "F"));

        graph.set_border("R", "N", true).unwrap();
        let layout = graph.layout_from_root("R");
        assert!(!layout.contains("N"));
        assert!(!layout.contains("F"));

        graph.set_border("R", "N", false).unwrap();
        let layout = graph.layout_from_root("R");
        assert_eq!(layout.position("N"), Some((-1, 0)));
        assert_eq!(layout.position("F"), Some((-2, 0)));
    }

    #[test]
    fn test_relayout_sets_grid() {
        let mut graph = RoomGraph::new();
        add(&mut graph, RoomInfo::new("R").with_link("south", "S"));

        graph.relayout("R").unwrap();
        assert_eq!(graph.room("S").unwrap().grid, Some((0, 1)));
        assert!(matches!(
            graph.relayout("missing"),
            Err(GraphError::UnknownRoom(_))
        ));
    }

    #[test]
    fn test_remove_room() {
        let mut graph = RoomGraph::new();
        add(
            &mut graph,
            RoomInfo::new("A").with_link("east", "B").with_link("west", "C"),
        );

        assert!(graph.remove_room("B").is_some());
        assert!(graph.edge("A", "B").is_none());
        assert!(graph.edge("A", "C").is_some());
        assert!(graph.remove_room("B").is_none());

        // 殘留的出口指向未知房間，版面配置會略過
        let layout = graph.layout_from_root("A");
        assert!(!layout.contains("B"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile").join("map.json");

        let mut graph = RoomGraph::new();
        add(
            &mut graph,
            RoomInfo::new("R1")
                .with_short("A road")
                .with_terrain(7)
                .with_link("north", "R2")
                .with_link("east", "R3")
                .with_exit("north", DOOR_CLOSED)
                .with_exit("east", 4),
        );
        graph.set_border("R1", "R3", true).unwrap();
        graph.relayout("R1").unwrap();

        graph.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = RoomGraph::load(&path).unwrap();
        assert_eq!(loaded, graph);
        assert_eq!(loaded.room("R1").unwrap().grid, None);
        let edge = loaded.edge("R1", "R3").unwrap();
        assert!(edge.border);
        assert_eq!(edge.exit_kind, Some(4));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let graph = RoomGraph::load(&dir.path().join("map.json")).unwrap();
        assert!(graph.is_empty());
    }
}
