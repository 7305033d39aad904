use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use crate::engine::{LiveTimer, TimerKey};
use crate::models::{Category, Profile, TimerListing};
use chrono::Utc;
use rusqlite::Error::InvalidParameterName;

/// Log IO-related DB errors for easier diagnosis (disk full, permission denied).
/// Does not change error propagation — caller still returns Err.
fn log_io_error_if_any(context: &str, e: &rusqlite::Error) {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => {
                error!(
                    "[DB] {}: Disk full. Free space on drive or check app data directory.",
                    context
                );
            }
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                error!(
                    "[DB] {}: Permission denied or read-only. Check app data directory is writable.",
                    context
                );
            }
            ErrorCode::SystemIoFailure => {
                error!("[DB] {}: I/O error. Check disk and permissions.", context);
            }
            _ => {}
        }
    }
}

/// Менеджер базы данных
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Безопасная блокировка соединения с обработкой poisoned mutex
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, rusqlite::Error> {
        self.conn.lock().map_err(|e| {
            InvalidParameterName(format!(
                "Database mutex poisoned: {}. A panic occurred while holding the lock. \
                 Please restart the application to recover.",
                e
            ))
        })
    }

    pub fn new(db_path: &str) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        // GUARD: Integrity check on startup — detect corruption before init
        let integrity: String = conn
            .query_row("PRAGMA integrity_check", [], |r| r.get(0))
            .map_err(|e| InvalidParameterName(format!("Integrity check failed: {}", e)))?;
        if integrity.to_lowercase() != "ok" {
            return Err(InvalidParameterName(format!(
                "Database corruption detected: {}",
                integrity
            )));
        }

        // WAL (Write-Ahead Logging) — лучшая защита от corruption при аварийном выходе
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| {
                warn!(
                    "[DB] Failed to enable WAL mode: {}. Continuing with default journal mode.",
                    e
                );
            })
            .ok();

        // Reduce disk I/O during per-tick snapshot writes (safe with WAL)
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "temp_store", "MEMORY");

        // foreign_keys для целостности categories/timers
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| {
                warn!("[DB] Failed to enable foreign keys: {}. Continuing.", e);
            })
            .ok();

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Current schema version (PRAGMA user_version). Bump when adding migrations.
    const SCHEMA_VERSION: i32 = 3;

    /// Versioned migrations using SQLite user_version pragma.
    fn run_migrations(&self) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        let current: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

        if current < 1 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                image TEXT,
                created_date TEXT NOT NULL,
                last_accessed TEXT
            )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                FOREIGN KEY(profile_id) REFERENCES profiles(id)
            )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS timers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                sub_category TEXT,
                time TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY(profile_id) REFERENCES profiles(id),
                FOREIGN KEY(category_id) REFERENCES categories(id)
            )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_categories_profile ON categories(profile_id)",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_timers_profile ON timers(profile_id)",
                [],
            )?;
        }

        // Migration 2: profile ordering for drag-and-drop (idempotent ALTER)
        if current < 2 {
            let _ = conn.execute(
                "ALTER TABLE profiles ADD COLUMN profile_order INTEGER DEFAULT 0",
                [],
            );
        }

        // Migration 3: live-state cache (переживает перезапуск процесса)
        if current < 3 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS live_timers (
                category TEXT NOT NULL,
                sub_category TEXT NOT NULL,
                nominal_seconds INTEGER NOT NULL,
                remaining_seconds INTEGER NOT NULL,
                running INTEGER NOT NULL DEFAULT 0,
                anchor_ms INTEGER NOT NULL DEFAULT 0,
                last_updated_at INTEGER NOT NULL,
                PRIMARY KEY(category, sub_category)
            )",
                [],
            )?;
        }

        conn.pragma_update(None, "user_version", Self::SCHEMA_VERSION)?;
        Ok(())
    }

    // ============================================
    // PROFILES
    // ============================================

    /// Создать профиль; порядок — в конец списка
    pub fn create_profile(&self, name: &str, image: Option<&str>) -> SqliteResult<i64> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        let next_order: i64 = conn.query_row(
            "SELECT COALESCE(MAX(profile_order), -1) + 1 FROM profiles",
            [],
            |r| r.get(0),
        )?;
        conn.execute(
            "INSERT INTO profiles (name, image, created_date, last_accessed, profile_order)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, image, now, now, next_order],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Список профилей в пользовательском порядке
    pub fn fetch_profiles(&self) -> SqliteResult<Vec<Profile>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, image, created_date, last_accessed, profile_order
             FROM profiles ORDER BY profile_order ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Profile {
                id: row.get(0)?,
                name: row.get(1)?,
                image: row.get(2)?,
                created_date: row.get(3)?,
                last_accessed: row.get(4)?,
                profile_order: row.get(5)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Сохранить порядок профилей после drag-and-drop (по имени, как в рендерере)
    pub fn update_profile_order(&self, ordering: &[(String, i64)]) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute("BEGIN IMMEDIATE TRANSACTION", []).map_err(|e| {
            log_io_error_if_any("update_profile_order begin", &e);
            e
        })?;
        for (name, order) in ordering {
            if let Err(e) = conn.execute(
                "UPDATE profiles SET profile_order = ?1 WHERE name = ?2",
                params![order, name],
            ) {
                let _ = conn.execute("ROLLBACK", []);
                return Err(e);
            }
        }
        conn.execute("COMMIT", []).map_err(|e| {
            log_io_error_if_any("update_profile_order commit", &e);
            let _ = conn.execute("ROLLBACK", []);
            e
        })?;
        Ok(())
    }

    /// Отметить доступ к профилю (last_accessed). false = профиля нет
    pub fn touch_profile(&self, profile_id: i64) -> SqliteResult<bool> {
        let conn = self.lock_conn()?;
        let affected = conn.execute(
            "UPDATE profiles SET last_accessed = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), profile_id],
        )?;
        Ok(affected > 0)
    }

    // ============================================
    // CATEGORIES
    // ============================================

    pub fn create_category(&self, profile_id: i64, name: &str) -> SqliteResult<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO categories (profile_id, name) VALUES (?1, ?2)",
            params![profile_id, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn fetch_categories(&self, profile_id: i64) -> SqliteResult<Vec<Category>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, profile_id, name FROM categories WHERE profile_id = ?1")?;
        let rows = stmt.query_map(params![profile_id], |row| {
            Ok(Category {
                id: row.get(0)?,
                profile_id: row.get(1)?,
                name: row.get(2)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Поиск категории без учёта регистра (для проверки дубликатов при создании)
    pub fn find_category_by_name(
        &self,
        profile_id: i64,
        name: &str,
    ) -> SqliteResult<Option<Category>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, profile_id, name FROM categories
             WHERE profile_id = ?1 AND lower(name) = lower(?2) LIMIT 1",
        )?;
        let mut rows = stmt.query(params![profile_id, name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(Category {
                id: row.get(0)?,
                profile_id: row.get(1)?,
                name: row.get(2)?,
            }));
        }
        Ok(None)
    }

    // ============================================
    // TIMER DEFINITIONS
    // ============================================

    /// Создать определение таймера; time — канонический `HH:MM:SS`
    pub fn create_timer(
        &self,
        profile_id: i64,
        category_id: i64,
        sub_category: &str,
        time: &str,
    ) -> SqliteResult<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO timers (profile_id, category_id, sub_category, time)
             VALUES (?1, ?2, ?3, ?4)",
            params![profile_id, category_id, sub_category, time],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Таймеры профиля с именем категории (для отображения)
    pub fn fetch_timers(&self, profile_id: i64) -> SqliteResult<Vec<TimerListing>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT timers.id, timers.profile_id, timers.category_id,
                    categories.name, timers.sub_category, timers.time, timers.created_at
             FROM timers
             JOIN categories ON timers.category_id = categories.id
             WHERE timers.profile_id = ?1
             ORDER BY categories.name ASC, timers.id ASC",
        )?;
        let rows = stmt.query_map(params![profile_id], |row| {
            Ok(TimerListing {
                id: row.get(0)?,
                profile_id: row.get(1)?,
                category_id: row.get(2)?,
                category_name: row.get(3)?,
                sub_category: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                time: row.get(5)?,
                created_at: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Удалить определение таймера. false = уже нет такой строки (идемпотентно)
    pub fn delete_timer(&self, timer_id: i64) -> SqliteResult<bool> {
        let conn = self.lock_conn()?;
        let affected = conn.execute("DELETE FROM timers WHERE id = ?1", params![timer_id])?;
        Ok(affected > 0)
    }

    // ============================================
    // LIVE-STATE CACHE
    // ============================================

    /// Переписать кэш живого состояния целиком (снимок Registry).
    /// GUARD: одна транзакция — либо весь снимок, либо прежний (защита от partial writes)
    pub fn save_live_state(&self, snapshot: &[(TimerKey, LiveTimer)]) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now().timestamp();

        conn.execute("BEGIN IMMEDIATE TRANSACTION", []).map_err(|e| {
            log_io_error_if_any("save_live_state begin", &e);
            error!("[DB] Failed to begin transaction: {}", e);
            e
        })?;

        let result = (|| -> SqliteResult<()> {
            conn.execute("DELETE FROM live_timers", [])?;
            for (key, live) in snapshot {
                conn.execute(
                    "INSERT INTO live_timers
                     (category, sub_category, nominal_seconds, remaining_seconds,
                      running, anchor_ms, last_updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        key.category,
                        key.sub_category,
                        live.nominal_seconds,
                        live.remaining_seconds,
                        live.running as i64,
                        live.anchor_ms,
                        now
                    ],
                )?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", []).map_err(|e| {
                    log_io_error_if_any("save_live_state commit", &e);
                    error!("[DB] Failed to commit transaction: {}", e);
                    let _ = conn.execute("ROLLBACK", []);
                    e
                })?;
                Ok(())
            }
            Err(e) => {
                log_io_error_if_any("save_live_state", &e);
                error!(
                    "[DB] Failed to save live state: {}. Rolling back transaction.",
                    e
                );
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Загрузить кэш живого состояния (один раз при старте)
    pub fn load_live_state(&self) -> SqliteResult<Vec<(TimerKey, LiveTimer)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, sub_category, nominal_seconds, remaining_seconds, running, anchor_ms
             FROM live_timers",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                TimerKey {
                    category: row.get(0)?,
                    sub_category: row.get(1)?,
                },
                LiveTimer {
                    nominal_seconds: row.get(2)?,
                    remaining_seconds: row.get(3)?,
                    running: row.get::<_, i64>(4)? != 0,
                    anchor_ms: row.get(5)?,
                },
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Очистить кэш живого состояния (штатное завершение — таймеры не
    /// продолжают «тикать» через перезапуск)
    pub fn clear_live_state(&self) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM live_timers", [])?;
        Ok(())
    }
}
