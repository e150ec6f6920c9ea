use std::fmt;

use thiserror::Error;

/// Audio formats the registration endpoint accepts for `nota_voz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMediaType {
    Mpeg,
    Mp3,
    Wav,
    Ogg,
    Webm,
    M4a,
}

impl AudioMediaType {
    pub const ALL: [AudioMediaType; 6] = [
        Self::Mpeg,
        Self::Mp3,
        Self::Wav,
        Self::Ogg,
        Self::Webm,
        Self::M4a,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mpeg => "audio/mpeg",
            Self::Mp3 => "audio/mp3",
            Self::Wav => "audio/wav",
            Self::Ogg => "audio/ogg",
            Self::Webm => "audio/webm",
            Self::M4a => "audio/m4a",
        }
    }

    /// Parses a media type, ignoring case and parameters such as `;codecs=opus`.
    pub fn parse(value: &str) -> Result<Self, AudioError> {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == essence)
            .ok_or_else(|| AudioError::UnsupportedMediaType(value.to_string()))
    }

    /// Guesses the media type from a file extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "mp3" | "mpeg" | "mpga" => Some(Self::Mpeg),
            "wav" => Some(Self::Wav),
            "ogg" | "oga" | "opus" => Some(Self::Ogg),
            "webm" => Some(Self::Webm),
            "m4a" => Some(Self::M4a),
            _ => None,
        }
    }
}

impl fmt::Display for AudioMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("Por favor, selecciona un archivo de audio válido (MP3, WAV, OGG, WEBM, M4A)")]
    UnsupportedMediaType(String),
}

/// Voice note sent as the optional `nota_voz` part.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioAttachment {
    file_name: String,
    media_type: AudioMediaType,
    bytes: Vec<u8>,
}

impl AudioAttachment {
    /// Builds an attachment, rejecting media types outside the accepted set.
    pub fn new(
        file_name: impl Into<String>,
        media_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Self, AudioError> {
        Ok(Self {
            file_name: file_name.into(),
            media_type: AudioMediaType::parse(media_type)?,
            bytes,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media_type(&self) -> AudioMediaType {
        self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for AudioAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAttachment")
            .field("file_name", &self.file_name)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
