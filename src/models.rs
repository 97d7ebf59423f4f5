use serde::{Deserialize, Serialize};

/// How strongly a detection should be acted on.
///
/// The declaration order matters: `Advisory < Mandatory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Blocking is at the discretion of the consuming service
    #[serde(rename = "advisory")]
    Advisory,
    /// Must be blocked by all consuming services
    #[serde(rename = "mandatory")]
    Mandatory,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Advisory => "advisory",
            Severity::Mandatory => "mandatory",
        }
    }
}

/// Reasons a URL can be blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    /// Actively hostile content of some kind
    #[serde(rename = "malicious")]
    Malicious,
    /// The content owner has asked us to block
    #[serde(rename = "publisher-blocked")]
    PublisherBlocked,
    /// Sites which are mostly video content
    #[serde(rename = "media-video")]
    MediaVideo,
    /// Sites which are mostly audio content
    #[serde(rename = "media-audio")]
    MediaAudio,
    /// Sites which are mostly image content
    #[serde(rename = "media-image")]
    MediaImage,
    /// Sites with a mixture of media content
    #[serde(rename = "media-mixed")]
    MediaMixed,
    /// Sites with high interactivity and AJAX calls
    #[serde(rename = "high-io")]
    HighIo,
    /// Not on the allow list
    #[serde(rename = "not-explicitly-allowed")]
    NotAllowed,
    /// Escape hatch for poorly formatted values
    #[serde(rename = "other")]
    Other,
}

/// Tie-break order for reasons of equal severity. Do not rely on the enum's
/// own ordering; this array is the documented priority, worst first.
pub const REASON_PRIORITY: [Reason; 9] = [
    Reason::Malicious,
    Reason::PublisherBlocked,
    Reason::MediaVideo,
    Reason::MediaAudio,
    Reason::MediaImage,
    Reason::MediaMixed,
    Reason::HighIo,
    Reason::NotAllowed,
    Reason::Other,
];

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Malicious => "malicious",
            Reason::PublisherBlocked => "publisher-blocked",
            Reason::MediaVideo => "media-video",
            Reason::MediaAudio => "media-audio",
            Reason::MediaImage => "media-image",
            Reason::MediaMixed => "media-mixed",
            Reason::HighIo => "high-io",
            Reason::NotAllowed => "not-explicitly-allowed",
            Reason::Other => "other",
        }
    }

    /// Parse a raw tag value into a reason, falling back to `Other`.
    pub fn parse(value: &str) -> Reason {
        match value.trim() {
            "malicious" => Reason::Malicious,
            "publisher-blocked" => Reason::PublisherBlocked,
            "media-video" => Reason::MediaVideo,
            "media-audio" => Reason::MediaAudio,
            "media-image" => Reason::MediaImage,
            "media-mixed" => Reason::MediaMixed,
            "high-io" => Reason::HighIo,
            "not-explicitly-allowed" => Reason::NotAllowed,
            _ => Reason::Other,
        }
    }

    /// Get the severity of this reason.
    pub fn severity(&self) -> Severity {
        match self {
            Reason::Malicious | Reason::PublisherBlocked => Severity::Mandatory,
            _ => Severity::Advisory,
        }
    }

    /// Position in [`REASON_PRIORITY`], used as a sort tie-break.
    pub fn priority(&self) -> usize {
        REASON_PRIORITY
            .iter()
            .position(|reason| reason == self)
            .unwrap_or(REASON_PRIORITY.len())
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a rule hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "malware_feed")]
    MalwareFeed,
    #[serde(rename = "block_list")]
    BlockList,
    #[serde(rename = "allow_list")]
    AllowList,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::MalwareFeed => "malware_feed",
            Source::BlockList => "block_list",
            Source::AllowList => "allow_list",
        }
    }
}

/// A single rule hit for a URL: why it was flagged and by which source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Detection {
    pub reason: Reason,
    pub source: Source,
}

impl Detection {
    pub fn new(reason: Reason, source: Source) -> Self {
        Detection { reason, source }
    }

    /// Get how bad this detection is.
    pub fn severity(&self) -> Severity {
        self.reason.severity()
    }
}

/// A stored rule as returned by a rule source lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// SHA-256 of the rule text, 64 lowercase hex chars
    pub hash: String,
    /// The expanded URL the rule was registered under
    pub rule: String,
    /// Raw tags documenting why the rule exists / where it came from
    pub tags: Vec<String>,
}

impl RuleRecord {
    /// Parse the record's tags into reasons.
    pub fn reasons(&self) -> Vec<Reason> {
        self.tags.iter().map(|tag| Reason::parse(tag)).collect()
    }
}
