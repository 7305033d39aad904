use crate::Database;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
mod core;
mod db;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Источник времени. Внедряется в Registry, чтобы тесты могли подставить
/// управляемые часы вместо системных.
pub trait Clock: Send + Sync {
    /// Стеночное время в миллисекундах от UNIX epoch
    fn now_ms(&self) -> u64;
}

/// Системные часы (по умолчанию)
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Составная идентичность таймера `(category, sub_category)`.
/// Человекочитаема; коллизии при совпадении sub_category в разных
/// категориях не исключены — схема сохранена намеренно.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TimerKey {
    pub category: String,
    pub sub_category: String,
}

impl TimerKey {
    pub fn new(category: impl Into<String>, sub_category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            sub_category: sub_category.into(),
        }
    }
}

/// Живое состояние одного таймера.
/// Инвариант: пока running, remaining всегда ПЕРЕСЧИТЫВАЕТСЯ как
/// `nominal - floor((now - anchor)/1000)`, а не декрементируется —
/// пропущенные тики не накапливают дрейф.
#[derive(Debug, Clone, Serialize)]
pub struct LiveTimer {
    /// Номинальная длительность (секунды), скопирована из определения при старте
    pub nominal_seconds: u64,
    /// Оставшиеся секунды, ≥ 0
    pub remaining_seconds: u64,
    pub running: bool,
    /// Стеночный момент (мс) «виртуального» начала текущего отрезка
    pub anchor_ms: u64,
}

/// Фаза state machine, производная от полей LiveTimer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Ended,
}

impl LiveTimer {
    pub fn phase(&self) -> TimerPhase {
        if self.running {
            TimerPhase::Running
        } else if self.remaining_seconds == 0 {
            TimerPhase::Ended
        } else if self.remaining_seconds == self.nominal_seconds {
            TimerPhase::Idle
        } else {
            TimerPhase::Paused
        }
    }
}

/// Вид перехода для слоя отображения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// Только текст на карточке
    Updated,
    /// Стилизация «истёк» + разблокировка кнопки Start
    Ended,
}

/// Push-уведомление о переходе таймера
#[derive(Debug, Clone, Serialize)]
pub struct TransitionEvent {
    pub key: TimerKey,
    pub kind: TransitionKind,
    pub remaining_seconds: u64,
    pub running: bool,
}

/// Получатель переходов (Presentation Sync)
pub trait TransitionSink: Send + Sync {
    fn on_transition(&self, event: &TransitionEvent);
}

/// Timer Registry — общая карта живых таймеров.
/// Все операции атомарны через один Mutex; единственный автономный
/// источник переходов — `tick()` от планировщика.
pub struct TimerRegistry {
    pub(crate) entries: Arc<Mutex<HashMap<TimerKey, LiveTimer>>>,
    pub(crate) clock: Arc<dyn Clock>,
    /// База данных для кэша живого состояния
    pub(crate) db: Option<Arc<Database>>,
    /// Слабая ссылка — Registry не удерживает слой отображения живым
    pub(crate) sink: Mutex<Option<Weak<dyn TransitionSink>>>,
}

impl TimerRegistry {
    /// Создать Registry без БД (встраивание без персистентности и тесты)
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            db: None,
            sink: Mutex::new(None),
        }
    }

    /// Подписать получателя переходов
    pub fn set_transition_sink(&self, sink: Weak<dyn TransitionSink>) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
    }

    pub(crate) fn emit(&self, event: TransitionEvent) {
        let sink = match self.sink.lock() {
            Ok(slot) => slot.as_ref().and_then(|w| w.upgrade()),
            Err(_) => None,
        };
        if let Some(sink) = sink {
            sink.on_transition(&event);
        }
    }

    /// Снимок всех живых таймеров (для рендера и кэша)
    pub fn snapshot(&self) -> Vec<(TimerKey, LiveTimer)> {
        match self.entries.lock() {
            Ok(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Err(e) => {
                tracing::error!("[TIMER] Mutex poisoned in snapshot: {}", e);
                Vec::new()
            }
        }
    }

    /// Живое состояние одного таймера
    pub fn get(&self, key: &TimerKey) -> Option<LiveTimer> {
        self.entries.lock().ok()?.get(key).cloned()
    }
}
