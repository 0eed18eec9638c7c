//! Heuristic detection of competing wallet-injection scripts.
//!
//! This is a best-effort mitigation, not a security boundary: a script that
//! does not match any known signature passes through untouched.

/// A newly inserted script-like node as observed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptNode {
    /// Host-assigned identifier, used only for logging.
    pub id: String,
    /// External script URL, if any.
    pub src: Option<String>,
    /// Inline script body.
    pub text: String,
}

impl ScriptNode {
    pub fn inline(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            src: None,
            text: text.into(),
        }
    }

    pub fn external(id: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            src: Some(src.into()),
            text: String::new(),
        }
    }
}

/// Signatures of scripts that try to claim the provider slot.
pub const BUILTIN_SIGNATURES: [&str; 6] = [
    "window.ethereum=",
    "defineproperty(window,'ethereum'",
    "defineproperty(window,\"ethereum\"",
    "inpage.js",
    "injectprovider(",
    "window.ethereum||(window.ethereum",
];

/// Matches script nodes against normalized signatures.
#[derive(Debug, Clone)]
pub struct ScriptScanner {
    signatures: Vec<String>,
}

impl ScriptScanner {
    /// Built-in signatures plus any extra ones from configuration.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut signatures: Vec<String> = BUILTIN_SIGNATURES.iter().map(|s| normalize(s)).collect();
        signatures.extend(extra.into_iter().map(|s| normalize(s.as_ref())).filter(|s| !s.is_empty()));
        Self { signatures }
    }

    /// The signature a node matched, if any.
    pub fn matched_signature(&self, node: &ScriptNode) -> Option<&str> {
        let src = node.src.as_deref().map(normalize).unwrap_or_default();
        let text = normalize(&node.text);
        self.signatures
            .iter()
            .find(|sig| src.contains(sig.as_str()) || text.contains(sig.as_str()))
            .map(|s| s.as_str())
    }

    pub fn is_competing(&self, node: &ScriptNode) -> bool {
        self.matched_signature(node).is_some()
    }
}

impl Default for ScriptScanner {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

/// Lowercase and strip whitespace so formatting does not defeat matching.
fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_slot_assignment() {
        let scanner = ScriptScanner::default();
        let node = ScriptNode::inline("s1", "window.ethereum = new Proxy({}, handler);");
        assert!(scanner.is_competing(&node));

        let node = ScriptNode::inline("s2", "Object.defineProperty( window , 'ethereum', { get() {} })");
        assert!(scanner.is_competing(&node));
    }

    #[test]
    fn test_detects_external_inpage_script() {
        let scanner = ScriptScanner::default();
        let node = ScriptNode::external("s3", "chrome-extension://abc/INPAGE.JS");
        assert!(scanner.is_competing(&node));
    }

    #[test]
    fn test_leaves_unrelated_scripts() {
        let scanner = ScriptScanner::default();
        let node = ScriptNode::inline("s4", "console.log(window.ethereum?.isMetaMask)");
        assert!(!scanner.is_competing(&node));
        assert!(!scanner.is_competing(&ScriptNode::external("s5", "https://cdn.example/app.js")));
    }

    #[test]
    fn test_extra_signatures() {
        let scanner = ScriptScanner::new(["rogueWallet.install("]);
        let node = ScriptNode::inline("s6", "RogueWallet.install(window)");
        assert_eq!(scanner.matched_signature(&node), Some("roguewallet.install("));
    }
}
