//! The fixed MP4 target encoding.

use serde::Serialize;

/// MIME type of every produced artifact.
pub const OUTPUT_MIME_TYPE: &str = "video/mp4";

/// Target encoding for every conversion run.
///
/// This is a constant of the application: there is no configuration key and no
/// API that changes it. Use [`ConversionParameters::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionParameters {
    /// Logical name the input is written under.
    pub input_name: &'static str,
    /// Logical name the engine writes the output to.
    pub output_name: &'static str,
    pub video_codec: &'static str,
    pub preset: &'static str,
    pub video_bitrate_kbps: u32,
    pub max_fps: u32,
    pub audio_codec: &'static str,
    /// Encoder strictness, needed by older aac builds.
    pub strict: &'static str,
    pub audio_bitrate_kbps: u32,
    /// Container flags; `+faststart` moves the moov atom to the head of the file.
    pub movflags: &'static str,
}

impl Default for ConversionParameters {
    fn default() -> Self {
        Self {
            input_name: "input.mp4",
            output_name: "output.mp4",
            video_codec: "h264",
            preset: "fast",
            video_bitrate_kbps: 4000,
            max_fps: 30,
            audio_codec: "aac",
            strict: "experimental",
            audio_bitrate_kbps: 128,
            movflags: "+faststart",
        }
    }
}

impl ConversionParameters {
    /// Builds the engine argument list. Order matters for output parity.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.input_name.to_string(),
            "-c:v".to_string(),
            self.video_codec.to_string(),
            "-preset".to_string(),
            self.preset.to_string(),
            "-b:v".to_string(),
            format!("{}k", self.video_bitrate_kbps),
            "-vf".to_string(),
            format!("fps={}", self.max_fps),
            "-c:a".to_string(),
            self.audio_codec.to_string(),
            "-strict".to_string(),
            self.strict.to_string(),
            "-b:a".to_string(),
            format!("{}k", self.audio_bitrate_kbps),
            "-movflags".to_string(),
            self.movflags.to_string(),
            self.output_name.to_string(),
        ]
    }

    /// MIME type of the produced artifact.
    pub fn output_mime_type(&self) -> &'static str {
        OUTPUT_MIME_TYPE
    }
}
