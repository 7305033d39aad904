use crate::engine::{Clock, TimerRegistry};
use crate::Database;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

impl TimerRegistry {
    /// Инициализация с базой данных: один раз читает кэш живого состояния
    pub fn with_db(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        let registry = Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            db: Some(db),
            sink: Mutex::new(None),
        };

        if let Err(e) = registry.restore_live_state() {
            error!("[RECOVERY] Failed to restore live state from DB: {}", e);
        }

        registry
    }

    /// Сохранить снимок Registry в кэш. Вызывается на каждой мутации.
    /// Отказ хранилища НЕ откатывает состояние в памяти — таймер продолжает
    /// тикать, следующее успешное сохранение выравнивает кэш.
    pub(crate) fn persist_live_state(&self) {
        let db = match &self.db {
            Some(db) => db,
            None => return, // Нет БД — пропускаем
        };

        let snapshot = self.snapshot();
        if let Err(e) = db.save_live_state(&snapshot) {
            error!("[TIMER] Failed to save live state: {}", e);
        }
    }

    /// Восстановить живое состояние после перезапуска.
    /// GUARD: НИКОГДА не крашиться на ошибке восстановления.
    /// Работавший таймер восстанавливается как Paused на пересчитанном
    /// remaining (безопаснее: пользователь возобновляет вручную); дошедший
    /// до нуля за время простоя — как Ended.
    fn restore_live_state(&self) -> Result<(), String> {
        let db = match &self.db {
            Some(db) => db,
            None => {
                info!("[RECOVERY] No database available, starting with empty registry");
                return Ok(());
            }
        };

        let rows = match db.load_live_state() {
            Ok(rows) => rows,
            Err(e) => {
                // Продолжаем с пустым Registry — хуже от этого только
                // «состояние не пережило перезапуск»
                error!(
                    "[RECOVERY] Failed to load live state from DB: {}. Starting empty.",
                    e
                );
                return Ok(());
            }
        };

        if rows.is_empty() {
            info!("[RECOVERY] No cached live state found, starting fresh");
            return Ok(());
        }

        let now_ms = self.clock.now_ms();
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| format!("Mutex poisoned: {}", e))?;

        for (key, mut live) in rows {
            if live.running {
                let elapsed_secs = now_ms.saturating_sub(live.anchor_ms) / 1000;
                live.remaining_seconds = live.nominal_seconds.saturating_sub(elapsed_secs);
                live.running = false;
                if live.remaining_seconds == 0 {
                    info!(
                        "[RECOVERY] {:?} expired while process was down, restored as ended",
                        key
                    );
                } else {
                    info!(
                        "[RECOVERY] {:?} was running, restored as paused at {}s",
                        key, live.remaining_seconds
                    );
                }
            }
            if entries.insert(key.clone(), live).is_some() {
                warn!("[RECOVERY] Duplicate cache row for {:?}, keeping last", key);
            }
        }

        info!("[RECOVERY] Restored {} live timer(s) from cache", entries.len());
        Ok(())
    }

    /// Штатное завершение: очистить кэш живого состояния целиком.
    /// Наблюдаемое поведение оригинала сохранено — после нормального
    /// перезапуска таймеры не продолжают отсчёт.
    pub fn clear_live_state_on_shutdown(&self) {
        let db = match &self.db {
            Some(db) => db,
            None => return,
        };

        match db.clear_live_state() {
            Ok(()) => info!("[SHUTDOWN] Live-state cache cleared"),
            Err(e) => error!("[SHUTDOWN] Failed to clear live-state cache: {}", e),
        }
    }
}
