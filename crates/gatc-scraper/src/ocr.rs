use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::OcrError;

/// Longest OCR text stored per asset.
pub const MAX_OCR_TEXT_CHARS: usize = 20_000;

/// Environment switch; OCR is off unless set to a value outside
/// `1, true, yes, on`.
pub const DISABLE_ENV: &str = "GATC_DISABLE_OCR";

const DISABLE_VALUES: &[&str] = &["1", "true", "yes", "on"];

/// Text recognized in an asset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrResult {
    pub text: Option<String>,
    /// BCP-47 code of the recognition language.
    pub language: Option<String>,
    /// Mean word confidence in `0.0..=1.0`.
    pub confidence: Option<f64>,
}

#[derive(Clone)]
pub struct OcrProcessor {
    inner: Arc<OcrProcessorInner>,
}

struct OcrProcessorInner {
    languages: String,
    disabled: bool,
    disabled_notice_emitted: AtomicBool,
    init_failed: AtomicBool,
}

pub fn is_disabled_value(value: &str) -> bool {
    DISABLE_VALUES.contains(&value.trim().to_lowercase().as_str())
}

impl OcrProcessor {
    pub fn new(languages: &[String], disabled: bool) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(OcrProcessorInner {
                languages: lang_str,
                disabled,
                disabled_notice_emitted: AtomicBool::new(false),
                init_failed: AtomicBool::new(false),
            }),
        }
    }

    /// Reads `GATC_DISABLE_OCR` (default disabled) and `GATC_OCR_LANGUAGES`
    /// (comma separated Tesseract codes, default `eng`).
    pub fn from_env() -> Self {
        let disabled = is_disabled_value(&std::env::var(DISABLE_ENV).unwrap_or_else(|_| "1".into()));
        let languages: Vec<String> = std::env::var("GATC_OCR_LANGUAGES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self::new(&languages, disabled)
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.disabled
    }

    /// Runs OCR over PNG bytes.
    ///
    /// Returns an empty result when OCR is disabled, the input is empty, or
    /// Tesseract could not be initialized earlier in the run.
    pub fn extract(&self, png: &[u8]) -> Result<OcrResult, OcrError> {
        if self.inner.disabled {
            if !self.inner.disabled_notice_emitted.swap(true, Ordering::Relaxed) {
                tracing::info!(event = "ocr_disabled");
            }
            return Ok(OcrResult::default());
        }
        if self.inner.init_failed.load(Ordering::Relaxed) || png.is_empty() {
            return Ok(OcrResult::default());
        }

        let _span = tracing::info_span!("ocr.extract").entered();

        let mut lt = match leptess::LepTess::new(None, &self.inner.languages) {
            Ok(lt) => lt,
            Err(e) => {
                self.inner.init_failed.store(true, Ordering::Relaxed);
                tracing::error!(event = "ocr_init_error", error = %e);
                return Ok(OcrResult::default());
            }
        };

        lt.set_image_from_mem(png)
            .map_err(|e| OcrError::SetImage(e.to_string()))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| OcrError::Recognize(e.to_string()))?;
        let text = text.trim().to_string();

        if text.is_empty() {
            tracing::warn!(event = "ocr_empty_result");
            return Ok(OcrResult::default());
        }

        let confidence = f64::from(lt.mean_text_conf().clamp(0, 100)) / 100.0;
        let language = self
            .inner
            .languages
            .split('+')
            .next()
            .and_then(bcp47_from_tesseract)
            .map(str::to_string);

        tracing::info!(
            event = "ocr_detected",
            chars = text.chars().count(),
            language = language.as_deref(),
            confidence = confidence,
        );

        Ok(OcrResult {
            text: Some(text),
            language,
            confidence: Some(confidence),
        })
    }
}

/// Maps Tesseract traineddata names to BCP-47 language tags.
pub fn bcp47_from_tesseract(code: &str) -> Option<&'static str> {
    Some(match code {
        "eng" => "en",
        "spa" => "es",
        "fra" => "fr",
        "deu" => "de",
        "ita" => "it",
        "por" => "pt",
        "chi_sim" => "zh-Hans",
        "chi_tra" => "zh-Hant",
        "kor" => "ko",
        "vie" => "vi",
        "tgl" => "tl",
        "rus" => "ru",
        "ara" => "ar",
        "jpn" => "ja",
        "hin" => "hi",
        _ => return None,
    })
}

/// Trims OCR output and caps it at `max_chars` characters.
pub fn sanitize_ocr_text(text: Option<&str>, max_chars: usize) -> Option<String> {
    let cleaned = text?.trim();
    if cleaned.is_empty() {
        return None;
    }

    let length = cleaned.chars().count();
    if length > max_chars {
        tracing::warn!(
            event = "ocr_truncated",
            original_length = length,
            max_length = max_chars,
        );
        return Some(cleaned.chars().take(max_chars).collect());
    }

    Some(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocr_processor_languages() {
        let processor = OcrProcessor::new(&["eng".to_string(), "spa".to_string()], false);
        assert_eq!(processor.inner.languages, "eng+spa");
        let processor = OcrProcessor::new(&[], false);
        assert_eq!(processor.inner.languages, "eng");
    }

    #[test]
    fn test_disabled_values() {
        for v in ["1", "true", "YES", " on "] {
            assert!(is_disabled_value(v), "{v}");
        }
        for v in ["0", "false", "no", ""] {
            assert!(!is_disabled_value(v), "{v}");
        }
    }

    #[test]
    fn test_disabled_returns_empty_result() {
        let processor = OcrProcessor::new(&[], true);
        assert!(processor.is_disabled());
        assert_eq!(processor.extract(b"anything").unwrap(), OcrResult::default());
        assert_eq!(processor.extract(b"again").unwrap(), OcrResult::default());
        assert!(processor.inner.disabled_notice_emitted.load(Ordering::Relaxed));
    }

    #[test]
    fn test_empty_input_returns_empty_result() {
        let processor = OcrProcessor::new(&[], false);
        assert_eq!(processor.extract(&[]).unwrap(), OcrResult::default());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_ocr_text(None, 10), None);
        assert_eq!(sanitize_ocr_text(Some("   \n "), 10), None);
        assert_eq!(
            sanitize_ocr_text(Some("  Vote Tuesday \n"), 100).as_deref(),
            Some("Vote Tuesday")
        );
        assert_eq!(sanitize_ocr_text(Some("abcdefghij"), 4).as_deref(), Some("abcd"));
        assert_eq!(
            sanitize_ocr_text(Some(&"x".repeat(MAX_OCR_TEXT_CHARS + 5)), MAX_OCR_TEXT_CHARS)
                .map(|s| s.len()),
            Some(MAX_OCR_TEXT_CHARS)
        );
    }

    #[test]
    fn test_language_mapping() {
        assert_eq!(bcp47_from_tesseract("eng"), Some("en"));
        assert_eq!(bcp47_from_tesseract("spa"), Some("es"));
        assert_eq!(bcp47_from_tesseract("xyz"), None);
    }
}
