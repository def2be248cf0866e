//! 連線迴圈的各種期限
//!
//! 不直接持有 tokio 計時器，只計算「下一次該醒來的時間」，
//! 由 `connect::run` 在每一輪 `select!` 轉成 `sleep_until`。

use std::time::{Duration, Instant};

/// 地圖變動後延遲存檔的時間
pub const MAP_SAVE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug)]
pub struct LoopSchedule {
    prompt_idle: Duration,
    timer_resolution: Duration,
    prompt: Option<Instant>,
    save: Option<Instant>,
    last_tick: Instant,
}

impl LoopSchedule {
    pub fn new(prompt_idle: Duration, timer_resolution: Duration, now: Instant) -> Self {
        Self {
            prompt_idle,
            timer_resolution,
            prompt: None,
            save: None,
            last_tick: now,
        }
    }

    /// 收到伺服器資料：有未結束的行就重新計算閒置期限
    pub fn on_receive(&mut self, now: Instant, has_partial: bool) {
        self.prompt = has_partial.then(|| now + self.prompt_idle);
    }

    /// 地圖變動：每次變動都把存檔期限往後延
    pub fn on_map_changed(&mut self, now: Instant) {
        self.save = Some(now + MAP_SAVE_DELAY);
    }

    pub fn prompt_deadline(&self) -> Option<Instant> {
        self.prompt
    }

    pub fn save_deadline(&self) -> Option<Instant> {
        self.save
    }

    /// 閒置期限已到，清除並回傳是否需要輸出提示字元
    pub fn take_prompt(&mut self, now: Instant) -> bool {
        take_due(&mut self.prompt, now)
    }

    pub fn take_save(&mut self, now: Instant) -> bool {
        take_due(&mut self.save, now)
    }

    /// 下一次計時器檢查的時間
    ///
    /// 兩次檢查之間至少相隔 `timer_resolution`
    pub fn timer_deadline(&self, next_due: Option<Instant>) -> Option<Instant> {
        next_due.map(|due| due.max(self.last_tick + self.timer_resolution))
    }

    pub fn on_tick(&mut self, now: Instant) {
        self.last_tick = now;
    }
}

fn take_due(slot: &mut Option<Instant>, now: Instant) -> bool {
    match *slot {
        Some(deadline) if deadline <= now => {
            *slot = None;
            true
        }
        _ => false,
    }
}

/// 等到期限；沒有期限時永遠不完成
pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
