//! Runtime configuration
//!
//! Command-line flags with `STREAMBOX_*` environment fallbacks. Defaults
//! match a Raspberry Pi appliance with a V4L2 camera, an ALSA capture card
//! and a push button wired to BCM pin 18 with a pull-up.

use crate::hardware::{DebounceSettings, Level};
use crate::stream::EncoderSettings;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "streambox", version, about)]
pub struct AppConfig {
    /// Address the HTTP server listens on
    #[arg(long, env = "STREAMBOX_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Directory the encoder writes its live playlist and segments into
    #[arg(long, env = "STREAMBOX_HLS_DIR", default_value = "/tmp/hls")]
    pub hls_dir: PathBuf,

    /// Directory holding recorded videos
    #[arg(long, env = "STREAMBOX_VIDEO_DIR", default_value = "/mnt/nas/videos")]
    pub video_dir: PathBuf,

    /// Encoder executable
    #[arg(long, env = "STREAMBOX_ENCODER", default_value = "ffmpeg")]
    pub encoder: String,

    /// V4L2 capture device
    #[arg(long, env = "STREAMBOX_VIDEO_DEVICE", default_value = "/dev/video0")]
    pub video_device: String,

    /// ALSA capture device
    #[arg(long, env = "STREAMBOX_AUDIO_DEVICE", default_value = "hw:1,0")]
    pub audio_device: String,

    /// Video codec passed to the encoder
    #[arg(long, env = "STREAMBOX_VIDEO_CODEC", default_value = "h264_omx")]
    pub video_codec: String,

    /// GPIO pin number of the toggle button
    #[arg(long, env = "STREAMBOX_BUTTON_PIN", default_value_t = 18)]
    pub button_pin: u32,

    /// Run without the hardware button
    #[arg(long, env = "STREAMBOX_NO_BUTTON")]
    pub no_button: bool,

    /// Logic level the button reads while pressed
    #[arg(long, env = "STREAMBOX_BUTTON_ACTIVE", value_enum, default_value_t = Level::Low)]
    pub button_active: Level,

    /// Debounce window in milliseconds
    #[arg(long, env = "STREAMBOX_DEBOUNCE_MS", default_value_t = 500)]
    pub debounce_ms: u64,

    /// Button poll interval in milliseconds
    #[arg(long, env = "STREAMBOX_POLL_INTERVAL_MS", default_value_t = 10)]
    pub poll_interval_ms: u64,

    /// Time the encoder gets to exit after SIGTERM before it is killed
    #[arg(long, env = "STREAMBOX_STOP_GRACE_MS", default_value_t = 5000)]
    pub stop_grace_ms: u64,

    /// Upper bound for graceful shutdown of the server and the encoder
    #[arg(long, env = "STREAMBOX_SHUTDOWN_TIMEOUT_SECS", default_value_t = 15)]
    pub shutdown_timeout_secs: u64,

    /// Messages buffered per status subscriber before it is dropped
    #[arg(long, env = "STREAMBOX_SUBSCRIBER_QUEUE", default_value_t = 32)]
    pub subscriber_queue: usize,
}

impl AppConfig {
    /// Encoder settings derived from this configuration
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            program: self.encoder.clone(),
            video_device: self.video_device.clone(),
            audio_device: self.audio_device.clone(),
            video_codec: self.video_codec.clone(),
            ..EncoderSettings::default()
        }
    }

    /// Debounce settings for the toggle button
    pub fn debounce_settings(&self) -> DebounceSettings {
        DebounceSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            window: Duration::from_millis(self.debounce_ms),
            active: self.button_active,
        }
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
