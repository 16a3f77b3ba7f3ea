//! Protocol capabilities.
//!
//! Capabilities ride on the first line of a ref advertisement (after a NUL)
//! and on the first want or command line of a request. They are an ordered,
//! space-separated list of `name` or `name=value` tokens.
//! See: https://git-scm.com/docs/protocol-capabilities

use crate::{ProtocolError, Result};
use std::fmt;

/// Agent string sent when the caller does not supply one.
pub const DEFAULT_AGENT: &str = concat!("gitwire/", env!("CARGO_PKG_VERSION"));

/// A protocol capability token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `multi_ack`
    MultiAck,
    /// `multi_ack_detailed`
    MultiAckDetailed,
    /// `no-done`
    NoDone,
    /// `thin-pack`
    ThinPack,
    /// `side-band`
    SideBand,
    /// `side-band-64k`
    SideBand64k,
    /// `ofs-delta`
    OfsDelta,
    /// `agent=<name>`
    Agent,
    /// `shallow`
    Shallow,
    /// `deepen-since`
    DeepenSince,
    /// `deepen-not`
    DeepenNot,
    /// `deepen-relative`
    DeepenRelative,
    /// `no-progress`
    NoProgress,
    /// `include-tag`
    IncludeTag,
    /// `report-status`
    ReportStatus,
    /// `delete-refs`
    DeleteRefs,
    /// `quiet`
    Quiet,
    /// `atomic`
    Atomic,
    /// `push-options`
    PushOptions,
    /// `allow-tip-sha1-in-want`
    AllowTipSha1InWant,
    /// `allow-reachable-sha1-in-want`
    AllowReachableSha1InWant,
    /// `push-cert=<nonce>`
    PushCert,
    /// `symref=<src>:<dst>`
    SymRef,
    /// `object-format=<algo>`
    ObjectFormat,
    /// `filter`
    Filter,
    /// Any token this crate does not know about.
    Other(String),
}

impl Capability {
    /// Returns the wire name of the capability.
    pub fn as_str(&self) -> &str {
        match self {
            Self::MultiAck => "multi_ack",
            Self::MultiAckDetailed => "multi_ack_detailed",
            Self::NoDone => "no-done",
            Self::ThinPack => "thin-pack",
            Self::SideBand => "side-band",
            Self::SideBand64k => "side-band-64k",
            Self::OfsDelta => "ofs-delta",
            Self::Agent => "agent",
            Self::Shallow => "shallow",
            Self::DeepenSince => "deepen-since",
            Self::DeepenNot => "deepen-not",
            Self::DeepenRelative => "deepen-relative",
            Self::NoProgress => "no-progress",
            Self::IncludeTag => "include-tag",
            Self::ReportStatus => "report-status",
            Self::DeleteRefs => "delete-refs",
            Self::Quiet => "quiet",
            Self::Atomic => "atomic",
            Self::PushOptions => "push-options",
            Self::AllowTipSha1InWant => "allow-tip-sha1-in-want",
            Self::AllowReachableSha1InWant => "allow-reachable-sha1-in-want",
            Self::PushCert => "push-cert",
            Self::SymRef => "symref",
            Self::ObjectFormat => "object-format",
            Self::Filter => "filter",
            Self::Other(name) => name,
        }
    }

    /// Parses a capability name (without any `=value` part).
    pub fn parse(name: &str) -> Self {
        match name {
            "multi_ack" => Self::MultiAck,
            "multi_ack_detailed" => Self::MultiAckDetailed,
            "no-done" => Self::NoDone,
            "thin-pack" => Self::ThinPack,
            "side-band" => Self::SideBand,
            "side-band-64k" => Self::SideBand64k,
            "ofs-delta" => Self::OfsDelta,
            "agent" => Self::Agent,
            "shallow" => Self::Shallow,
            "deepen-since" => Self::DeepenSince,
            "deepen-not" => Self::DeepenNot,
            "deepen-relative" => Self::DeepenRelative,
            "no-progress" => Self::NoProgress,
            "include-tag" => Self::IncludeTag,
            "report-status" => Self::ReportStatus,
            "delete-refs" => Self::DeleteRefs,
            "quiet" => Self::Quiet,
            "atomic" => Self::Atomic,
            "push-options" => Self::PushOptions,
            "allow-tip-sha1-in-want" => Self::AllowTipSha1InWant,
            "allow-reachable-sha1-in-want" => Self::AllowReachableSha1InWant,
            "push-cert" => Self::PushCert,
            "symref" => Self::SymRef,
            "object-format" => Self::ObjectFormat,
            "filter" => Self::Filter,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered set of capabilities, each with zero or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityList {
    entries: Vec<(Capability, Vec<String>)>,
}

impl CapabilityList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a space-separated capability list.
    ///
    /// A name that appears more than once (e.g. `symref`) accumulates values.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| ProtocolError::Malformed("capabilities are not UTF-8".to_string()))?;

        let mut list = Self::new();
        for token in text.split(' ').map(str::trim).filter(|t| !t.is_empty()) {
            match token.split_once('=') {
                Some((name, value)) => list.add(Capability::parse(name), Some(value)),
                None => list.add(Capability::parse(token), None),
            }
        }
        Ok(list)
    }

    /// Returns true if no capability is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of distinct capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the capability is present.
    pub fn supports(&self, cap: &Capability) -> bool {
        self.entries.iter().any(|(c, _)| c == cap)
    }

    /// Returns the values of a capability, if present.
    pub fn get(&self, cap: &Capability) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(c, _)| c == cap)
            .map(|(_, values)| values.as_slice())
    }

    /// Sets a capability, replacing any values it had.
    pub fn set(&mut self, cap: Capability, values: Vec<String>) {
        match self.entries.iter_mut().find(|(c, _)| *c == cap) {
            Some(entry) => entry.1 = values,
            None => self.entries.push((cap, values)),
        }
    }

    /// Adds a capability, appending the value if one is given.
    pub fn add(&mut self, cap: Capability, value: Option<&str>) {
        let idx = match self.entries.iter().position(|(c, _)| *c == cap) {
            Some(idx) => idx,
            None => {
                self.entries.push((cap, Vec::new()));
                self.entries.len() - 1
            }
        };
        if let Some(value) = value {
            self.entries[idx].1.push(value.to_string());
        }
    }

    /// Removes a capability.
    pub fn delete(&mut self, cap: &Capability) {
        self.entries.retain(|(c, _)| c != cap);
    }

    /// Iterates over capabilities in order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter().map(|(c, _)| c)
    }
}

impl fmt::Display for CapabilityList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (cap, values) in &self.entries {
            if values.is_empty() {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(cap.as_str())?;
                first = false;
            }
            for value in values {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{cap}={value}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_advertised() {
        let raw = b"multi_ack thin-pack side-band side-band-64k ofs-delta shallow \
                    no-progress include-tag multi_ack_detailed no-done \
                    symref=HEAD:refs/heads/master agent=git/2.43.0";
        let list = CapabilityList::decode(raw).unwrap();

        assert!(list.supports(&Capability::MultiAck));
        assert!(list.supports(&Capability::NoDone));
        assert!(!list.supports(&Capability::ReportStatus));
        assert_eq!(
            list.get(&Capability::SymRef).unwrap(),
            &["HEAD:refs/heads/master".to_string()]
        );
        assert_eq!(list.get(&Capability::Agent).unwrap(), &["git/2.43.0".to_string()]);
        assert_eq!(list.to_string(), std::str::from_utf8(raw).unwrap());
    }

    #[test]
    fn test_unknown_tokens_are_kept() {
        let list = CapabilityList::decode(b"report-status push-cert=1234 frobnicate").unwrap();
        assert!(list.supports(&Capability::Other("frobnicate".to_string())));
        assert_eq!(list.to_string(), "report-status push-cert=1234 frobnicate");
    }

    #[test]
    fn test_set_add_delete() {
        let mut list = CapabilityList::new();
        list.add(Capability::SymRef, Some("HEAD:refs/heads/main"));
        list.add(Capability::SymRef, Some("refs/remotes/origin/HEAD:refs/heads/main"));
        list.add(Capability::OfsDelta, None);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(&Capability::SymRef).unwrap().len(), 2);

        list.set(Capability::SymRef, vec!["HEAD:refs/heads/dev".to_string()]);
        assert_eq!(list.to_string(), "symref=HEAD:refs/heads/dev ofs-delta");

        list.delete(&Capability::SymRef);
        assert_eq!(list.to_string(), "ofs-delta");
        assert!(!list.is_empty());
    }

    #[test]
    fn test_parse_roundtrips_names() {
        for name in ["multi_ack_detailed", "side-band-64k", "allow-reachable-sha1-in-want"] {
            assert_eq!(Capability::parse(name).as_str(), name);
        }
    }
}
