use crate::engine::TimerRegistry;
use scopeguard::guard;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Tick Scheduler — единственный общий драйвер с периодом 1 секунда.
/// Один на всё приложение/представление (никогда не «по интервалу на
/// таймер»): корректность при пропуске тиков обеспечивает пересчёт от
/// якорей внутри Registry, а не сам планировщик.
pub struct TickScheduler {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TickScheduler {
    /// Запустить драйвер. Вызывается один раз при загрузке представления.
    pub fn start(registry: Arc<TimerRegistry>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = stop.clone();

        let handle = std::thread::spawn(move || {
            // Guard: факт выхода потока логируется даже при панике в tick
            let _exit = guard((), |_| info!("[TICK] Scheduler thread exited"));

            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(
                        "[TICK] Failed to create runtime for tick scheduler: {}. \
                        Timers will not advance autonomously.",
                        e
                    );
                    return;
                }
            };

            rt.block_on(async {
                use std::time::UNIX_EPOCH;
                use tokio::time::MissedTickBehavior;

                // Микро-синхронизация: первый тик — на границе системной
                // секунды (12:00:00.000, не .500)
                if let Ok(now) = std::time::SystemTime::now().duration_since(UNIX_EPOCH) {
                    let now_ms = now.as_millis();
                    let next_sec_ms = (now_ms / 1000 + 1) * 1000;
                    let delay_ms = (next_sec_ms - now_ms).min(999);
                    if delay_ms > 0 {
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms as u64))
                            .await;
                    }
                }

                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
                // Skip: после лага хоста не навёрстываем пачку тиков — один
                // tick пересчитает истинное прошедшее время от якорей
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if stop_for_thread.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = registry.tick_now() {
                        error!("[TICK] Registry tick failed: {}", e);
                    }
                }
            });
        });

        info!("[TICK] Scheduler started (1s period)");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Остановить драйвер. Идемпотентно; вызывается ровно один раз при
    /// разборке представления (Drop подстраховывает).
    pub fn shutdown(&mut self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            info!("[TICK] Scheduler shutdown requested");
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
