//! Background writer threads.
//!
//! [`BackgroundWriter`] owns a channel and the thread draining it.  The
//! owner thread only ever sends; file writes and external commands happen
//! on the writer thread.  Closing the writer (explicitly or by dropping it)
//! waits until everything already queued has been handled, so nothing is
//! lost when the daemon stops.

use log::{debug, warn};
use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// A named thread that hands every queued item to a write function.
pub struct BackgroundWriter<T: Send + 'static> {
    name: &'static str,
    tx: Option<mpsc::Sender<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> BackgroundWriter<T> {
    /// Spawn the thread.  With `coalesce`, items that queued up while the
    /// previous write ran collapse into the newest one.
    pub fn spawn<F>(name: &'static str, coalesce: bool, mut write: F) -> io::Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<T>();
        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            while let Ok(mut item) = rx.recv() {
                if coalesce {
                    while let Ok(newer) = rx.try_recv() {
                        item = newer;
                    }
                }
                write(item);
            }
            debug!("{} thread exiting", name);
        })?;
        Ok(Self {
            name,
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue `item`.  Returns `false` if the thread is gone.
    pub fn send(&self, item: T) -> bool {
        match &self.tx {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// Close the queue and wait for the thread to drain it.
    pub fn close(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{} thread panicked", self.name);
            }
        }
    }
}

impl<T: Send + 'static> Drop for BackgroundWriter<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn recording(coalesce: bool, delay: Duration) -> (BackgroundWriter<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let writer = BackgroundWriter::spawn("test-writer", coalesce, move |n| {
            thread::sleep(delay);
            sink.lock().unwrap().push(n);
        })
        .unwrap();
        (writer, seen)
    }

    #[test]
    fn close_waits_for_queued_items() {
        let (mut writer, seen) = recording(false, Duration::from_millis(20));
        for n in 0..5 {
            assert!(writer.send(n));
        }
        writer.close();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(!writer.send(9));
    }

    #[test]
    fn drop_also_drains() {
        let (writer, seen) = recording(false, Duration::from_millis(20));
        writer.send(1);
        writer.send(2);
        drop(writer);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn coalescing_keeps_the_newest() {
        let (mut writer, seen) = recording(true, Duration::from_millis(50));
        for n in 0..10 {
            writer.send(n);
        }
        writer.close();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&9));
        assert!(seen.len() < 10);
    }
}
