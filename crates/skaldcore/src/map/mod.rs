//! 自動地圖模組
//!
//! - `room`: 房間與 `Room.Info` 資料
//! - `graph`: 房間圖、版面配置與持久化
//! - `controller`: 目前位置追蹤與繪製清單

mod controller;
mod direction;
mod graph;
mod room;

pub use controller::{classify_edges, Connector, DrawList, DrawRoom, MapController, MapUpdate, Viewport};
pub use direction::{is_non_positional, split_suffix, Direction};
pub use graph::{Door, Edge, GraphError, Layout, MapStoreError, RoomGraph, DOOR_CLOSED, DOOR_OPEN};
pub use room::{terrain_name, Links, Room, RoomInfo, TERRAIN_TYPES, UNEXPLORED};
