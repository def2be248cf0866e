//! 房間與 GMCP `Room.Info` 資料

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 未探索房間的地形代碼
pub const UNEXPLORED: i32 = -1;

/// GMCP `type` 地形代碼與名稱
pub const TERRAIN_TYPES: &[(i32, &str)] = &[
    (-1, "unexplored"),
    (0, "none"),
    (1, "water"),
    (2, "under water"),
    (3, "air"),
    (4, "desert"),
    (5, "arctic"),
    (6, "mountain"),
    (7, "meadow"),
    (8, "forest"),
    (9, "beach"),
    (10, "swamp"),
    (11, "town"),
    (12, "jungle"),
    (13, "cave"),
];

/// 地形名稱，未知代碼回傳 `None`
pub fn terrain_name(code: i32) -> Option<&'static str> {
    TERRAIN_TYPES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// 出口清單（方向 -> 房間 ID），保持伺服器送來的順序
///
/// 版面配置的結果取決於出口順序，所以不能用 `HashMap`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links(Vec<(String, String)>);

impl Links {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定出口，已存在的方向會原地更新
    pub fn insert(&mut self, direction: impl Into<String>, room: impl Into<String>) {
        let direction = direction.into();
        let room = room.into();
        match self.0.iter_mut().find(|(d, _)| *d == direction) {
            Some(slot) => slot.1 = room,
            None => self.0.push((direction, room)),
        }
    }

    pub fn get(&self, direction: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(d, _)| d == direction)
            .map(|(_, r)| r.as_str())
    }

    /// 第一個通往 `room` 的方向
    pub fn direction_to(&self, room: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, r)| r == room)
            .map(|(d, _)| d.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(d, r)| (d.as_str(), r.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<D: Into<String>, R: Into<String>> FromIterator<(D, R)> for Links {
    fn from_iter<I: IntoIterator<Item = (D, R)>>(iter: I) -> Self {
        let mut links = Links::new();
        for (d, r) in iter {
            links.insert(d, r);
        }
        links
    }
}

impl Serialize for Links {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (d, r) in &self.0 {
            map.serialize_entry(d, r)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Links {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LinksVisitor;

        impl<'de> Visitor<'de> for LinksVisitor {
            type Value = Links;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of direction to room id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Links, A::Error> {
                let mut links = Links::new();
                while let Some((direction, room)) = access.next_entry::<String, RoomId>()? {
                    links.insert(direction, room.0);
                }
                Ok(links)
            }
        }

        deserializer.deserialize_map(LinksVisitor)
    }
}

/// 房間 ID，有些伺服器送數字
struct RoomId(String);

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => RoomId(s),
            Raw::Number(n) => RoomId(n.to_string()),
        })
    }
}

fn deserialize_room_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RoomId::deserialize(deserializer).map(|id| id.0)
}

/// 地圖上的房間
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    /// 簡短描述
    #[serde(default)]
    pub short: String,
    /// 地形代碼，[`UNEXPLORED`] 代表尚未造訪
    #[serde(default = "unexplored")]
    pub terrain: i32,
    #[serde(default)]
    pub links: Links,
    /// 最近一次版面配置的格子座標（不保存）
    #[serde(skip)]
    pub grid: Option<(i32, i32)>,
}

fn unexplored() -> i32 {
    UNEXPLORED
}

impl Room {
    /// 只知道 ID 的未探索房間
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            short: String::new(),
            terrain: UNEXPLORED,
            links: Links::new(),
            grid: None,
        }
    }

    pub fn is_explored(&self) -> bool {
        self.terrain != UNEXPLORED
    }

    /// in/out/up/down 出口（小寫）
    pub fn non_positional_exits(&self) -> Vec<String> {
        self.links
            .iter()
            .map(|(d, _)| d.to_ascii_lowercase())
            .filter(|d| super::direction::is_non_positional(d))
            .collect()
    }
}

/// 座標不參與比較
impl PartialEq for Room {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.short == other.short
            && self.terrain == other.terrain
            && self.links == other.links
    }
}

impl Eq for Room {}

/// GMCP `Room.Info` 內容
///
/// 缺少的欄位代表「沒有新資料」，更新時會保留舊值
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoomInfo {
    #[serde(alias = "hash", alias = "num", deserialize_with = "deserialize_room_id")]
    pub id: String,
    #[serde(default)]
    pub short: Option<String>,
    #[serde(default, rename = "type")]
    pub terrain: Option<i32>,
    #[serde(default)]
    pub links: Option<Links>,
    /// 各方向的出口代碼（門或道路）
    #[serde(default)]
    pub exits: HashMap<String, i32>,
}

impl RoomInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_short(mut self, short: impl Into<String>) -> Self {
        self.short = Some(short.into());
        self
    }

    pub fn with_terrain(mut self, terrain: i32) -> Self {
        self.terrain = Some(terrain);
        self
    }

    pub fn with_link(mut self, direction: &str, room: &str) -> Self {
        self.links.get_or_insert_with(Links::new).insert(direction, room);
        self
    }

    pub fn with_exit(mut self, direction: &str, code: i32) -> Self {
        self.exits.insert(direction.to_string(), code);
        self
    }
}
