use crate::duration::{format_seconds, parse_canonical, parse_keystroke_digits};
use crate::engine::{
    LiveTimer, TimerKey, TimerRegistry, TransitionEvent, TransitionKind, TransitionSink,
};
use crate::models::{Profile, TimerError, TimerListing};
use crate::Database;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use tracing::{info, warn};

/// Точечное обновление одной карточки: текст, класс «истёк», состояние кнопок
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardUpdate {
    pub key: TimerKey,
    /// Отформатированный остаток `HH:MM:SS`
    pub display: String,
    /// true → Start заблокирован, Stop доступен
    pub running: bool,
    /// true → карточка стилизуется как истёкшая
    pub ended: bool,
}

/// Поверхность отображения. Ядро не знает про DOM/webview — только про
/// полный рендер списка и точечное обновление карточки.
pub trait PresentationSurface: Send + Sync {
    /// Полный рендер списка таймеров профиля (после fetch/мутраций CRUD)
    fn render_timers(
        &self,
        profile_id: i64,
        listings: &[TimerListing],
        live: &[(TimerKey, LiveTimer)],
    );
    /// Обновление одной карточки: трогается только её текст и класс,
    /// список не перерендеривается
    fn update_card(&self, update: &CardUpdate);
}

/// Выбор категории при добавлении таймера: существующая или новая по имени
#[derive(Debug, Clone)]
pub enum CategoryChoice {
    Existing(i64),
    New(String),
}

struct ViewState {
    profile_id: Option<i64>,
    /// Ключи карточек, отрисованных для активного профиля. Переходы по
    /// чужим ключам отбрасываются — устаревший рендер не трогаем.
    rendered: HashSet<TimerKey>,
}

/// Presentation Sync: транслирует переходы Registry в поверхность и
/// маршрутизирует действия пользователя обратно в Registry/хранилище.
pub struct PresentationSync {
    registry: Arc<TimerRegistry>,
    db: Arc<Database>,
    surface: Arc<dyn PresentationSurface>,
    view: Mutex<ViewState>,
}

impl PresentationSync {
    /// Создать слой отображения и подписать его на переходы Registry
    pub fn attach(
        registry: Arc<TimerRegistry>,
        db: Arc<Database>,
        surface: Arc<dyn PresentationSurface>,
    ) -> Arc<Self> {
        let sync = Arc::new(Self {
            registry: registry.clone(),
            db,
            surface,
            view: Mutex::new(ViewState {
                profile_id: None,
                rendered: HashSet::new(),
            }),
        });
        registry.set_transition_sink(Arc::downgrade(&sync) as Weak<dyn TransitionSink>);
        sync
    }

    // ============================================
    // PROFILES (тонкая маршрутизация в хранилище)
    // ============================================

    pub fn list_profiles(&self) -> Result<Vec<Profile>, TimerError> {
        Ok(self.db.fetch_profiles()?)
    }

    pub fn create_profile(
        &self,
        name: &str,
        image: Option<&str>,
    ) -> Result<i64, TimerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TimerError::Validation("Profile name is empty".to_string()));
        }
        Ok(self.db.create_profile(name, image)?)
    }

    /// Сохранить порядок профилей после drag-and-drop
    pub fn reorder_profiles(&self, ordering: &[(String, i64)]) -> Result<(), TimerError> {
        Ok(self.db.update_profile_order(ordering)?)
    }

    // ============================================
    // VIEW LIFECYCLE
    // ============================================

    /// Переключиться на профиль: предыдущие карточки глохнут (их ключи
    /// выбывают из rendered — планировщик продолжает тикать данные, но
    /// устаревший рендер больше не трогается), список рисуется заново.
    pub fn show_profile(&self, profile_id: i64) -> Result<Vec<TimerListing>, TimerError> {
        match self.db.touch_profile(profile_id) {
            Ok(true) => {}
            Ok(false) => {
                return Err(TimerError::NotFound(format!(
                    "Profile {} does not exist",
                    profile_id
                )))
            }
            // Отказ хранилища не фатален — рендерим, что сможем прочитать
            Err(e) => warn!("[VIEW] Failed to touch profile {}: {}", profile_id, e),
        }

        let listings = self.db.fetch_timers(profile_id)?;
        {
            let mut view = self
                .view
                .lock()
                .map_err(|e| TimerError::Store(format!("Mutex poisoned: {}", e)))?;
            view.profile_id = Some(profile_id);
            view.rendered = listings
                .iter()
                .map(|t| TimerKey::new(t.category_name.clone(), t.sub_category.clone()))
                .collect();
        }

        info!(
            "[VIEW] Showing profile {} ({} timer(s))",
            profile_id,
            listings.len()
        );
        self.surface
            .render_timers(profile_id, &listings, &self.registry.snapshot());
        Ok(listings)
    }

    /// Перечитать и перерисовать активный профиль (после CRUD-мутаций)
    fn refresh(&self) -> Result<(), TimerError> {
        let profile_id = {
            let view = self
                .view
                .lock()
                .map_err(|e| TimerError::Store(format!("Mutex poisoned: {}", e)))?;
            view.profile_id
        };
        if let Some(profile_id) = profile_id {
            self.show_profile(profile_id)?;
        }
        Ok(())
    }

    // ============================================
    // TIMER ACTIONS
    // ============================================

    /// Добавить таймер; создаёт категорию на лету при необходимости.
    /// Ввод длительности валидируется ДО обращения к Registry/хранилищу.
    pub fn add_timer(
        &self,
        profile_id: i64,
        category: CategoryChoice,
        sub_category: &str,
        raw_duration: &str,
    ) -> Result<i64, TimerError> {
        let seconds = parse_keystroke_digits(raw_duration);
        if seconds == 0 {
            return Err(TimerError::Validation(
                "Please enter a valid time (e.g. 3000 for 30 minutes)".to_string(),
            ));
        }

        let category_id = match category {
            CategoryChoice::Existing(id) => id,
            CategoryChoice::New(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(TimerError::Validation("Category name is empty".to_string()));
                }
                if self.db.find_category_by_name(profile_id, &name)?.is_some() {
                    return Err(TimerError::Validation(format!(
                        "Category already exists: {}",
                        name
                    )));
                }
                self.db.create_category(profile_id, &name)?
            }
        };

        let timer_id = self.db.create_timer(
            profile_id,
            category_id,
            sub_category.trim(),
            &format_seconds(seconds),
        )?;

        self.refresh()?;
        Ok(timer_id)
    }

    /// Start с карточки; номинал читается из канонического текста определения
    pub fn start_timer(&self, key: &TimerKey, time_text: &str) -> Result<(), TimerError> {
        let nominal = parse_canonical(time_text);
        self.registry
            .start(key, nominal)
            .map_err(TimerError::Store)?;
        Ok(())
    }

    pub fn stop_timer(&self, key: &TimerKey) -> Result<(), TimerError> {
        self.registry.stop(key).map_err(TimerError::Store)?;
        Ok(())
    }

    pub fn reset_timer(&self, key: &TimerKey, time_text: &str) -> Result<(), TimerError> {
        let nominal = parse_canonical(time_text);
        self.registry
            .reset(key, nominal)
            .map_err(TimerError::Store)?;
        Ok(())
    }

    /// Удалить определение и живую запись. Отсутствующее определение —
    /// идемпотентный no-op (уже удалено).
    pub fn delete_timer(&self, timer_id: i64, key: &TimerKey) -> Result<(), TimerError> {
        let found = self.db.delete_timer(timer_id)?;
        if !found {
            warn!(
                "[VIEW] delete_timer: definition {} not found, treated as already deleted",
                timer_id
            );
        }
        self.registry.remove(key).map_err(TimerError::Store)?;
        self.refresh()?;
        Ok(())
    }
}

impl TransitionSink for PresentationSync {
    fn on_transition(&self, event: &TransitionEvent) {
        // Карточки чужого/прошлого профиля не обновляем
        let rendered = match self.view.lock() {
            Ok(view) => view.rendered.contains(&event.key),
            Err(e) => {
                warn!("[VIEW] Mutex poisoned in on_transition: {}", e);
                return;
            }
        };
        if !rendered {
            return;
        }

        self.surface.update_card(&CardUpdate {
            key: event.key.clone(),
            display: format_seconds(event.remaining_seconds),
            running: event.running,
            ended: event.kind == TransitionKind::Ended
                || (event.remaining_seconds == 0 && !event.running),
        });
    }
}
