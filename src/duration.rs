//! Кодек длительностей: цифровой ввод ⇄ канонический `HH:MM:SS` ⇄ секунды.

/// Позиционный разбор "сырых" нажатий клавиш: не-цифры отбрасываются,
/// последние две цифры — секунды, следующие две — минуты, остаток — часы.
/// "3000" → 30 минут, "12345" → 1ч 23м 45с. Пустой ввод → 0.
pub fn parse_keystroke_digits(raw: &str) -> u64 {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return 0;
    }

    let n = digits.len();
    let seconds: u64 = digits[n.saturating_sub(2)..].parse().unwrap_or(0);
    let minutes: u64 = if n > 2 {
        digits[n.saturating_sub(4)..n - 2].parse().unwrap_or(0)
    } else {
        0
    };
    // Часы не ограничены двумя цифрами; абсурдно длинный префикс не парсится → 0
    let hours: u64 = if n > 4 {
        digits[..n - 4].parse().unwrap_or(0)
    } else {
        0
    };

    // Гигантский префикс часов упирается в потолок u64, а не паникует
    hours
        .saturating_mul(3600)
        .saturating_add(minutes * 60)
        .saturating_add(seconds)
}

/// Форматирование секунд в `HH:MM:SS`. Компоненты дополняются нулями до двух
/// цифр; часы расширяются сверх двух цифр при total ≥ 100 часов (не обрезаем).
pub fn format_seconds(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Разбор канонического `HH:MM:SS`. Всё, что не ровно три числовых части,
/// трактуется как 0 — осознанно снисходительное поведение, не строгая валидация.
pub fn parse_canonical(text: &str) -> u64 {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 3 {
        return 0;
    }
    let mut components = [0u64; 3];
    for (i, part) in parts.iter().enumerate() {
        match part.trim().parse::<u64>() {
            Ok(v) => components[i] = v,
            Err(_) => return 0,
        }
    }
    components[0]
        .saturating_mul(3600)
        .saturating_add(components[1].saturating_mul(60))
        .saturating_add(components[2])
}
