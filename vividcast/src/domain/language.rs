//! Supported target languages and narration voices.

/// Supported target language codes.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "en", "zh", "ja", "ko", "fr", "de", "es", "pt", "ru", "ar", "hi", "it", "nl", "sv", "id",
    "pl", "th", "tr", "vi", "ro", "uk", "bn", "mr", "ta", "te",
];

/// Prebuilt narration voice names accepted by the TTS stage.
pub const SUPPORTED_VOICES: &[&str] = &[
    "Zephyr",
    "Puck",
    "Charon",
    "Kore",
    "Fenrir",
    "Leda",
    "Orus",
    "Aoede",
    "Callirrhoe",
    "Autonoe",
    "Enceladus",
    "Iapetus",
    "Umbriel",
    "Algieba",
    "Despina",
    "Erinome",
    "Algenib",
    "Rasalgethi",
    "Laomedeia",
    "Achernar",
    "Alnilam",
    "Schedar",
    "Gacrux",
    "Pulcherrima",
    "Achird",
    "Zubenelgenubi",
    "Vindemiatrix",
    "Sadachbia",
    "Sadaltager",
    "Sulafat",
];

/// Default narration voice.
pub const DEFAULT_VOICE: &str = "Achernar";

/// Default target language.
pub const DEFAULT_LANGUAGE: &str = "en";

pub fn is_supported_language(code: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&code)
}

pub fn is_supported_voice(voice: &str) -> bool {
    SUPPORTED_VOICES.contains(&voice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_language_is_supported() {
        assert!(is_supported_language(DEFAULT_LANGUAGE));
        assert!(!is_supported_language("klingon"));
    }

    #[test]
    fn test_default_voice_is_supported() {
        assert!(is_supported_voice(DEFAULT_VOICE));
        assert!(!is_supported_voice("mike"));
    }
}
