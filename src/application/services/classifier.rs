/// How a failed send should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The recipient can never receive messages again.
    Permanent,
    /// Expected to clear up; eligible for retry.
    Transient,
    Unknown,
}

/// Signature of a pluggable classifier. Swap it out when a transport exposes
/// typed error codes.
pub type Classifier = fn(&anyhow::Error) -> FailureClass;

const PERMANENT_MARKERS: [&str; 3] = ["blocked", "deactivated", "chat not found"];
const TRANSIENT_MARKERS: [&str; 4] = ["timeout", "timed out", "network", "too many requests"];

/// Classifies by case-insensitive substring match on the full error chain.
pub fn classify_failure(err: &anyhow::Error) -> FailureClass {
    let text = format!("{err:#}").to_lowercase();

    if PERMANENT_MARKERS.iter().any(|m| text.contains(m)) {
        FailureClass::Permanent
    } else if TRANSIENT_MARKERS.iter().any(|m| text.contains(m)) {
        FailureClass::Transient
    } else {
        FailureClass::Unknown
    }
}
