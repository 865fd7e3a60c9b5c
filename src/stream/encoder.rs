//! Encoder command line
//!
//! Builds the FFmpeg invocation that captures camera and microphone and
//! writes a rolling HLS playlist.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the live playlist inside the output directory
pub const PLAYLIST_NAME: &str = "playlist.m3u8";

/// Capture and encoding options for the live stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderSettings {
    /// Encoder executable
    pub program: String,

    /// V4L2 video input device
    pub video_device: String,

    /// ALSA audio input device
    pub audio_device: String,

    /// Video codec (hardware accelerated on the Pi)
    pub video_codec: String,

    /// Maximum video bitrate, FFmpeg notation
    pub max_rate: String,

    /// Rate control buffer size, FFmpeg notation
    pub buffer_size: String,

    /// Keyframe interval in frames
    pub gop_size: u32,

    /// Audio bitrate, FFmpeg notation
    pub audio_bitrate: String,

    /// Audio sample rate in Hz
    pub audio_sample_rate: u32,

    /// Target segment duration in seconds
    pub segment_secs: u32,

    /// Number of segments kept in the playlist
    pub playlist_size: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            video_device: "/dev/video0".to_string(),
            audio_device: "hw:1,0".to_string(),
            video_codec: "h264_omx".to_string(),
            max_rate: "2000k".to_string(),
            buffer_size: "4000k".to_string(),
            gop_size: 50,
            audio_bitrate: "128k".to_string(),
            audio_sample_rate: 44100,
            segment_secs: 4,
            playlist_size: 15,
        }
    }
}

impl EncoderSettings {
    /// Build the command that writes the live stream into `output_dir`
    pub fn command(&self, output_dir: &Path) -> EncoderCommand {
        let playlist = output_dir.join(PLAYLIST_NAME);

        let args = vec![
            "-f".to_string(),
            "v4l2".to_string(),
            "-i".to_string(),
            self.video_device.clone(),
            "-f".to_string(),
            "alsa".to_string(),
            "-i".to_string(),
            self.audio_device.clone(),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-maxrate".to_string(),
            self.max_rate.clone(),
            "-bufsize".to_string(),
            self.buffer_size.clone(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-g".to_string(),
            self.gop_size.to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-ar".to_string(),
            self.audio_sample_rate.to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.segment_secs.to_string(),
            "-hls_list_size".to_string(),
            self.playlist_size.to_string(),
            "-hls_flags".to_string(),
            "delete_segments".to_string(),
            playlist.to_string_lossy().to_string(),
        ];

        EncoderCommand {
            program: self.program.clone(),
            args,
            playlist,
        }
    }
}

/// A fully resolved encoder invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    /// Executable to spawn
    pub program: String,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Where the process writes its output
    pub playlist: PathBuf,
}

impl EncoderCommand {
    /// Arbitrary command, mostly useful for substituting the encoder
    pub fn new<I, S>(program: impl Into<String>, args: I, playlist: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            playlist: playlist.into(),
        }
    }

    /// Directory the process writes into
    pub fn output_dir(&self) -> Option<&Path> {
        self.playlist.parent()
    }
}
