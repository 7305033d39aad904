use crate::engine::TimerRegistry;
use crate::engine::{LiveTimer, TimerKey, TransitionEvent, TransitionKind};
use tracing::{debug, warn};

impl TimerRegistry {
    /// Переход: Idle/Paused/Ended → Running
    /// Атомарная операция — один lock на весь переход.
    /// Идемпотентна: повторный start на работающем таймере лишь
    /// переподтверждает состояние кнопок.
    pub fn start(&self, key: &TimerKey, nominal_seconds: u64) -> Result<LiveTimer, String> {
        let now_ms = self.clock.now_ms();
        let result = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| format!("Mutex poisoned: {}", e))?;

            let entry = entries.entry(key.clone()).or_insert_with(|| LiveTimer {
                nominal_seconds,
                remaining_seconds: nominal_seconds,
                running: false,
                anchor_ms: 0,
            });
            // Определения неизменяемы, но номинал переподтверждаем на случай
            // записи кэша от более старой версии определения
            entry.nominal_seconds = nominal_seconds;

            // Истёкший таймер Start всегда перезапускает с полного номинала,
            // а не оставляет инертным на нуле
            if entry.remaining_seconds == 0 {
                entry.remaining_seconds = nominal_seconds;
            }

            if !entry.running {
                entry.running = true;
                // Якорь в прошлое ровно настолько, чтобы воспроизвести текущее
                // remaining: пересчёт по тикам продолжается без скачка
                entry.anchor_ms = now_ms.saturating_sub(
                    entry
                        .nominal_seconds
                        .saturating_sub(entry.remaining_seconds)
                        .saturating_mul(1000),
                );
            } else {
                debug!("[FSM] start on already-running {:?}: no-op", key);
            }

            entry.clone()
        }; // lock освобождён до сохранения

        self.persist_live_state();
        self.emit(TransitionEvent {
            key: key.clone(),
            kind: TransitionKind::Updated,
            remaining_seconds: result.remaining_seconds,
            running: result.running,
        });
        Ok(result)
    }

    /// Переход: Running → Paused
    /// Замораживает remaining на последнем пересчитанном значении.
    /// No-op, если таймер не работает или записи нет.
    pub fn stop(&self, key: &TimerKey) -> Result<Option<LiveTimer>, String> {
        let result = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| format!("Mutex poisoned: {}", e))?;

            match entries.get_mut(key) {
                Some(entry) if entry.running => {
                    entry.running = false;
                    Some(entry.clone())
                }
                Some(_) => {
                    debug!("[FSM] stop on non-running {:?}: no-op", key);
                    None
                }
                None => {
                    debug!("[FSM] stop on absent {:?}: no-op", key);
                    None
                }
            }
        };

        if let Some(frozen) = &result {
            self.persist_live_state();
            self.emit(TransitionEvent {
                key: key.clone(),
                kind: TransitionKind::Updated,
                remaining_seconds: frozen.remaining_seconds,
                running: false,
            });
        }
        Ok(result)
    }

    /// Переход: любое состояние → Idle
    /// Безусловно, даже если таймер ни разу не стартовал.
    pub fn reset(&self, key: &TimerKey, nominal_seconds: u64) -> Result<LiveTimer, String> {
        let result = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| format!("Mutex poisoned: {}", e))?;

            let fresh = LiveTimer {
                nominal_seconds,
                remaining_seconds: nominal_seconds,
                running: false,
                anchor_ms: 0,
            };
            entries.insert(key.clone(), fresh.clone());
            fresh
        };

        self.persist_live_state();
        self.emit(TransitionEvent {
            key: key.clone(),
            kind: TransitionKind::Updated,
            remaining_seconds: result.remaining_seconds,
            running: false,
        });
        Ok(result)
    }

    /// Тик планировщика: пересчитать все работающие таймеры от якоря.
    /// Единственный путь автономного выхода из Running. Достижение нуля
    /// даёт ровно один переход Ended — даже после пропуска нескольких тиков
    /// remaining пересчитывается от якоря и зажимается в 0 одним махом.
    pub fn tick(&self, now_ms: u64) -> Result<Vec<TransitionEvent>, String> {
        let events = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| format!("Mutex poisoned: {}", e))?;

            let mut events = Vec::new();
            for (key, entry) in entries.iter_mut() {
                if !entry.running {
                    continue;
                }

                let elapsed_secs = now_ms.saturating_sub(entry.anchor_ms) / 1000;
                entry.remaining_seconds = entry.nominal_seconds.saturating_sub(elapsed_secs);

                if entry.remaining_seconds == 0 {
                    // Переход: Running → Ended (running сбрасывается, Start
                    // снова доступен)
                    entry.running = false;
                    events.push(TransitionEvent {
                        key: key.clone(),
                        kind: TransitionKind::Ended,
                        remaining_seconds: 0,
                        running: false,
                    });
                } else {
                    events.push(TransitionEvent {
                        key: key.clone(),
                        kind: TransitionKind::Updated,
                        remaining_seconds: entry.remaining_seconds,
                        running: true,
                    });
                }
            }
            events
        }; // lock освобождён до сохранения

        if !events.is_empty() {
            self.persist_live_state();
            for event in &events {
                self.emit(event.clone());
            }
        }
        Ok(events)
    }

    /// Тик по внедрённым часам (используется планировщиком)
    pub fn tick_now(&self) -> Result<Vec<TransitionEvent>, String> {
        self.tick(self.clock.now_ms())
    }

    /// Удалить запись. Вызывается ПОСЛЕ удаления определения в хранилище;
    /// отсутствие записи — идемпотентный no-op.
    pub fn remove(&self, key: &TimerKey) -> Result<bool, String> {
        let removed = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| format!("Mutex poisoned: {}", e))?;
            entries.remove(key).is_some()
        };

        if removed {
            self.persist_live_state();
        } else {
            warn!("[TIMER] remove on absent {:?}: treated as already deleted", key);
        }
        Ok(removed)
    }
}
