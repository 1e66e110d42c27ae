use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct PendingEdit {
    field: String,
    value: String,
    due: Instant,
}

/// Buffers keystrokes for one field at a time.
///
/// The latest value for a field replaces the pending one. Switching to
/// another field hands back the previous field's edit so it is applied
/// immediately, and `flush` always hands back whatever is pending.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<PendingEdit>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Buffer an edit. Returns a pending edit for a different field, which
    /// must be applied now.
    pub fn push(&mut self, field: &str, value: &str, now: Instant) -> Option<(String, String)> {
        let switching = self.pending.as_ref().is_some_and(|p| p.field != field);
        let displaced = if switching { self.flush() } else { None };
        self.pending = Some(PendingEdit {
            field: field.to_string(),
            value: value.to_string(),
            due: now + self.delay,
        });
        displaced
    }

    /// Take the pending edit if its delay has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<(String, String)> {
        if self.pending.as_ref().is_some_and(|p| p.due <= now) {
            self.flush()
        } else {
            None
        }
    }

    /// Take the pending edit regardless of its delay.
    pub fn flush(&mut self) -> Option<(String, String)> {
        self.pending.take().map(|p| (p.field, p.value))
    }

    /// Value typed for `field` that has not been applied yet.
    pub fn pending_value(&self, field: &str) -> Option<&str> {
        self.pending
            .as_ref()
            .filter(|p| p.field == field)
            .map(|p| p.value.as_str())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_keystroke_wins() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        assert_eq!(debouncer.push("name", "A", start), None);
        assert_eq!(debouncer.push("name", "Al", start + Duration::from_millis(100)), None);
        assert_eq!(debouncer.take_due(start + Duration::from_millis(300)), None);

        let due = debouncer.take_due(start + Duration::from_millis(400));
        assert_eq!(due, Some(("name".to_string(), "Al".to_string())));
        assert!(!debouncer.has_pending());
    }

    #[test]
    fn test_switching_fields_hands_back_previous_edit() {
        let now = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_secs(1));

        debouncer.push("name", "Alice", now);
        let displaced = debouncer.push("amount", "4", now);
        assert_eq!(displaced, Some(("name".to_string(), "Alice".to_string())));
        assert_eq!(debouncer.pending_value("amount"), Some("4"));
        assert_eq!(debouncer.pending_value("name"), None);
    }

    #[test]
    fn test_flush_ignores_delay() {
        let now = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_secs(60));
        debouncer.push("name", "Bob", now);
        assert_eq!(debouncer.flush(), Some(("name".to_string(), "Bob".to_string())));
        assert_eq!(debouncer.flush(), None);
    }
}
