//! 方向與座標位移
//!
//! 出口名稱可以帶 `up` / `down` 後綴（例如 `northup`），
//! 版面配置只看去掉後綴的基本方向。

/// 八個羅盤方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

/// 不參與版面配置的出口
pub const NON_POSITIONAL: [&str; 4] = ["in", "out", "up", "down"];

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// 從方向名稱解析（不分大小寫，接受縮寫）
    pub fn from_name(name: &str) -> Option<Self> {
        let dir = match name.to_ascii_lowercase().as_str() {
            "north" | "n" => Self::North,
            "northeast" | "ne" => Self::NorthEast,
            "east" | "e" => Self::East,
            "southeast" | "se" => Self::SouthEast,
            "south" | "s" => Self::South,
            "southwest" | "sw" => Self::SouthWest,
            "west" | "w" => Self::West,
            "northwest" | "nw" => Self::NorthWest,
            _ => return None,
        };
        Some(dir)
    }

    /// 從出口名稱解析，會先去掉 `up` / `down` 後綴
    ///
    /// # Example
    /// ```
    /// use skaldcore::map::Direction;
    ///
    /// assert_eq!(Direction::parse_exit("northup"), Some(Direction::North));
    /// assert_eq!(Direction::parse_exit("up"), None);
    /// ```
    pub fn parse_exit(token: &str) -> Option<Self> {
        let (base, _) = split_suffix(token);
        Self::from_name(&base)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::North => "north",
            Self::NorthEast => "northeast",
            Self::East => "east",
            Self::SouthEast => "southeast",
            Self::South => "south",
            Self::SouthWest => "southwest",
            Self::West => "west",
            Self::NorthWest => "northwest",
        }
    }

    /// 格子位移 (dx, dy)，y 軸向下為正
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
        }
    }

    /// 數字鍵盤代碼（8 = 北，2 = 南，依此類推）
    pub fn keypad(&self) -> u8 {
        match self {
            Self::NorthWest => 7,
            Self::North => 8,
            Self::NorthEast => 9,
            Self::West => 4,
            Self::East => 6,
            Self::SouthWest => 1,
            Self::South => 2,
            Self::SouthEast => 3,
        }
    }

    pub fn from_keypad(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.keypad() == code)
    }
}

/// 拆出 `up` / `down` 後綴，回傳（小寫基本名稱, 後綴）
pub fn split_suffix(token: &str) -> (String, Option<&'static str>) {
    let lower = token.trim().to_ascii_lowercase();
    for suffix in ["up", "down"] {
        if let Some(base) = lower.strip_suffix(suffix) {
            if !base.is_empty() {
                return (base.to_string(), Some(suffix));
            }
        }
    }
    (lower, None)
}

/// 是否為 in/out/up/down 這類不定位的出口
pub fn is_non_positional(token: &str) -> bool {
    let lower = token.trim().to_ascii_lowercase();
    NON_POSITIONAL.contains(&lower.as_str())
}
