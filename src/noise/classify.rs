//! Error classification by message signature.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    Wallet,
    /// The embedding frame or host application.
    Host,
    Network,
    Ui,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Wallet => "wallet",
            ErrorCategory::Host => "host",
            ErrorCategory::Network => "network",
            ErrorCategory::Ui => "ui",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub severity: Severity,
    /// Known benign chatter; never logged above debug.
    pub noisy: bool,
}

struct Signature {
    pattern: &'static str,
    category: ErrorCategory,
    severity: Severity,
    noisy: bool,
}

const fn sig(pattern: &'static str, category: ErrorCategory, severity: Severity, noisy: bool) -> Signature {
    Signature {
        pattern,
        category,
        severity,
        noisy,
    }
}

// First match wins, so specific patterns precede generic ones.
const SIGNATURES: &[Signature] = &[
    sig("cannot redefine property", ErrorCategory::Wallet, Severity::Low, true),
    sig("cannot set property ethereum", ErrorCategory::Wallet, Severity::Low, true),
    sig("redefinition blocked", ErrorCategory::Wallet, Severity::Low, true),
    sig("user rejected", ErrorCategory::Wallet, Severity::Low, false),
    sig("blocked a frame with origin", ErrorCategory::Host, Severity::Low, true),
    sig("failed to execute 'postmessage'", ErrorCategory::Host, Severity::Low, true),
    sig("cross-origin", ErrorCategory::Host, Severity::Low, true),
    sig("resizeobserver loop", ErrorCategory::Ui, Severity::Low, true),
    sig("subscriber panicked", ErrorCategory::Ui, Severity::High, false),
    sig("failed to fetch", ErrorCategory::Network, Severity::Medium, false),
    sig("networkerror", ErrorCategory::Network, Severity::Medium, false),
    sig("connection refused", ErrorCategory::Network, Severity::High, false),
    sig("timed out", ErrorCategory::Network, Severity::Medium, false),
    sig("timeout", ErrorCategory::Network, Severity::Medium, false),
    sig("wallet", ErrorCategory::Wallet, Severity::Medium, false),
    sig("provider", ErrorCategory::Wallet, Severity::Medium, false),
    sig("ethereum", ErrorCategory::Wallet, Severity::Medium, false),
    sig("frame", ErrorCategory::Host, Severity::Medium, false),
    sig("origin", ErrorCategory::Host, Severity::Medium, false),
    sig("hydration", ErrorCategory::Ui, Severity::Medium, false),
    sig("render", ErrorCategory::Ui, Severity::Medium, false),
];

/// Classify a message by case-insensitive substring match.
pub fn classify(message: &str) -> Classification {
    let lowered = message.to_lowercase();
    SIGNATURES
        .iter()
        .find(|s| lowered.contains(s.pattern))
        .map(|s| Classification {
            category: s.category,
            severity: s.severity,
            noisy: s.noisy,
        })
        .unwrap_or(Classification {
            category: ErrorCategory::Unknown,
            severity: Severity::Medium,
            noisy: false,
        })
}
