use serde::Serialize;
use std::fmt;

/// Профиль (верхний уровень группировки)
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    pub created_date: String,
    pub last_accessed: Option<String>,
    pub profile_order: i64,
}

/// Категория внутри профиля
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub profile_id: i64,
    pub name: String,
}

/// Строка списка таймеров профиля (timers JOIN categories)
#[derive(Debug, Clone, Serialize)]
pub struct TimerListing {
    pub id: i64,
    pub profile_id: i64,
    pub category_id: i64,
    pub category_name: String,
    pub sub_category: String,
    /// Номинальная длительность в каноническом виде `HH:MM:SS`
    pub time: String,
    pub created_at: String,
}

/// Ошибки ядра таймеров (для разбора и показа пользователю)
#[derive(Debug)]
pub enum TimerError {
    /// Пустой/неразбираемый ввод длительности — отклоняется до Registry
    Validation(String),
    /// Операция над отсутствующей сущностью — трактуется как уже удалённая
    NotFound(String),
    /// Отказ хранилища — не фатально, состояние в памяти не откатывается
    Store(String),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::Validation(s) => write!(f, "Validation: {}", s),
            TimerError::NotFound(s) => write!(f, "Not found: {}", s),
            TimerError::Store(s) => write!(f, "Store: {}", s),
        }
    }
}

impl std::error::Error for TimerError {}

impl From<rusqlite::Error> for TimerError {
    fn from(e: rusqlite::Error) -> Self {
        TimerError::Store(e.to_string())
    }
}
