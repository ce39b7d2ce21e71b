use parking_lot::{Condvar, Mutex};

/// Counts in-flight jobs for one pipeline stage. `wait` blocks until
/// the count drains to zero, which is how the batch loop fences each
/// phase before moving on.
#[derive(Default)]
pub struct PendingJobCounter {
    count: Mutex<usize>,
    zero: Condvar,
}

impl PendingJobCounter {
    pub fn increment(&self) {
        *self.count.lock() += 1;
    }

    pub fn decrement(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "pending counter underflow");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_blocks_until_drained() {
        let counter = Arc::new(PendingJobCounter::default());
        for _ in 0..8 {
            counter.increment();
        }
        let worker = {
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..8 {
                    thread::sleep(Duration::from_millis(1));
                    counter.decrement();
                }
            })
        };
        counter.wait();
        worker.join().unwrap();
        counter.wait();
    }
}
