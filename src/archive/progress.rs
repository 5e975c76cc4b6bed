use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct Counter {
    bytes: u64,
    logged_step: u64,
}

/// Byte progress of one transfer, logged every 10%
#[derive(Debug)]
pub struct TransferProgress {
    label: String,
    total: u64,
    counter: Mutex<Counter>,
}

impl TransferProgress {
    pub fn new(label: impl Into<String>, total: u64) -> Self {
        Self {
            label: label.into(),
            total,
            counter: Mutex::new(Counter::default()),
        }
    }

    /// Adds `bytes` to the running total and returns it
    pub fn record(&self, bytes: u64) -> u64 {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        counter.bytes += bytes;

        if self.total > 0 {
            let step = (counter.bytes.min(self.total) * 10 / self.total).min(10);
            if step > counter.logged_step {
                counter.logged_step = step;
                tracing::info!(
                    "{}: {}% ({}/{} bytes)",
                    self.label,
                    step * 10,
                    counter.bytes,
                    self.total
                );
            }
        }
        counter.bytes
    }

    pub fn transferred(&self) -> u64 {
        self.counter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bytes
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_accumulates() {
        let progress = TransferProgress::new("upload", 100);
        assert_eq!(progress.record(30), 30);
        assert_eq!(progress.record(25), 55);
        assert_eq!(progress.transferred(), 55);
        assert_eq!(progress.total(), 100);
    }

    #[test]
    fn test_concurrent_records() {
        let progress = Arc::new(TransferProgress::new("upload", 8000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let progress = Arc::clone(&progress);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        progress.record(10);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(progress.transferred(), 8000);
    }

    #[test]
    fn test_zero_total_does_not_divide() {
        let progress = TransferProgress::new("empty", 0);
        assert_eq!(progress.record(0), 0);
    }
}
