// Capture backends
//
// Platform device streams (cpal on desktop, oboe on Android) are not Send,
// so each backend opens its stream on a dedicated capture thread that owns
// it until stop. `CaptureThread` implements that ownership dance once.

use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::error::AudioError;

#[cfg(not(target_os = "android"))]
pub mod cpal;
#[cfg(target_os = "android")]
pub mod oboe;
pub mod synthetic;

pub use synthetic::SyntheticSource;

/// Thread that opens a device stream, keeps it alive, and drops it on stop
pub(crate) struct CaptureThread {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl CaptureThread {
    /// Run `open` on a new thread and wait for it to report success
    ///
    /// `open` builds and starts the stream; whatever it returns is held on
    /// the capture thread until `shutdown` is called or the handle dropped.
    pub(crate) fn spawn<S, F>(name: &str, open: F) -> Result<Self, AudioError>
    where
        F: FnOnce() -> Result<S, AudioError> + Send + 'static,
        S: 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || match open() {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Blocks until shutdown sends or the handle drops the sender
                    let _ = stop_rx.recv();
                    drop(stream);
                    log::debug!("[CaptureThread] Stream released");
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { stop_tx, handle }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::DeviceUnavailable {
                    reason: "capture thread exited during startup".to_string(),
                })
            }
        }
    }

    /// Release the stream and join the capture thread
    pub(crate) fn shutdown(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            log::error!("[CaptureThread] Capture thread panicked during shutdown");
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        /// Microphone source for the current platform
        pub fn default_source() -> Box<dyn super::AudioSource> {
            Box::new(oboe::OboeSource::new())
        }
    } else {
        /// Microphone source for the current platform
        pub fn default_source() -> Box<dyn super::AudioSource> {
            Box::new(self::cpal::CpalSource::default_device())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Guard(Arc<AtomicBool>);

    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_stream_released_on_shutdown() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let thread = CaptureThread::spawn("test-capture", move || Ok(Guard(flag))).unwrap();
        assert!(!released.load(Ordering::SeqCst));

        thread.shutdown();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_open_failure_is_returned() {
        let result = CaptureThread::spawn::<(), _>("test-capture", || {
            Err(AudioError::DeviceUnavailable {
                reason: "no microphone".to_string(),
            })
        });
        assert!(matches!(
            result,
            Err(AudioError::DeviceUnavailable { .. })
        ));
    }
}
