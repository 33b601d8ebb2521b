// Clap To Find Core - real-time clap detection engine
// Microphone capture, lock-free hand-off, windowed spectral analysis and a
// temporal pattern matcher that turns clap scores into trigger events.

// Module declarations
pub mod analysis;
#[cfg(target_os = "android")]
pub mod android;
pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod testing;
pub mod trigger;

// Re-exports for convenience
pub use analysis::{
    ClapDetector, ClapModel, ClassificationScore, FnClapModel, HeuristicClapModel, TriggerEvent,
    WindowReport,
};
pub use audio::{AudioSource, PcmFrame, SyntheticSource};
pub use config::AppConfig;
pub use error::{AudioError, ErrorCode, PipelineError};
pub use pipeline::{ClapPipeline, PipelineEvent, PipelineStatsSnapshot};
pub use trigger::{BroadcastSink, LogSink, TriggerSink};

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install the global tracing subscriber
///
/// Android logs go to logcat under the `ClapToFind` tag; everywhere else
/// they go to stderr. Only the first call has any effect.
pub fn init_logging(max_level: tracing::Level) {
    LOGGING.call_once(|| install_subscriber(max_level));
}

#[cfg(target_os = "android")]
fn install_subscriber(max_level: tracing::Level) {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    match tracing_android::layer("ClapToFind") {
        Ok(layer) => {
            let _ = tracing_subscriber::registry()
                .with(layer)
                .with(LevelFilter::from_level(max_level))
                .try_init();
        }
        Err(err) => eprintln!("ClapToFind: failed to create logcat layer: {}", err),
    }
}

#[cfg(not(target_os = "android"))]
fn install_subscriber(max_level: tracing::Level) {
    // A host application may already own the global subscriber
    let _ = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(tracing::Level::DEBUG);
        init_logging(tracing::Level::TRACE);
        tracing::info!("logging initialized");
    }
}
