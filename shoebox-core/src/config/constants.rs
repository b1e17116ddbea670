//! Fixed policy constants, centralized so nothing is hardcoded at call sites.

/// Below this the classifier's answer is not trusted and the user is asked.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Above this a name match blocks auto-filing until resolved.
pub const DUPLICATE_BLOCK_THRESHOLD: f64 = 0.8;

/// Above this a name match is mentioned on the confirmation. Informational
/// only, never blocks filing.
pub const WEAK_MATCH_THRESHOLD: f64 = 0.5;

/// Nickname matches are slightly discounted against title matches.
pub const NICKNAME_SCALE: f64 = 0.9;

/// Word-overlap scores are discounted against containment scores.
pub const WORD_OVERLAP_SCALE: f64 = 0.8;

/// Confidence assigned to records filed via `create_related`. A fixed policy
/// constant, not derived from the oracle.
pub const RELATED_CAPTURE_CONFIDENCE: f64 = 0.9;

/// How many search hits a query hands to the oracle.
pub const MAX_QUERY_RESULTS: usize = 10;

/// Webhook replay window in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Default age after which idle thread contexts are swept.
pub const DEFAULT_SWEEP_MAX_AGE_DAYS: i64 = 30;

/// Bounded timeout for every outbound HTTP call. No automatic retries.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

pub mod llm {
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const TRANSCRIPTION_MODEL: &str = "whisper-1";
}
