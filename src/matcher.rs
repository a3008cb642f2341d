use std::collections::BTreeMap;
use std::fmt;

use crate::model::{MethodInfo, MethodInfoPair};
use log::{debug, info};

/// Identity of a method across both formats: `class.name` + `.` + name +
/// descriptor, compared byte for byte
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodKey(String);

impl MethodKey {
    pub fn of(method: &MethodInfo) -> Self {
        Self(format!(
            "{}.{}{}",
            method.class.name, method.name, method.descriptor
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The same method seen from both formats
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub jvm: MethodInfo,
    pub dex: MethodInfo,
}

/// Groups methods from both formats by key.
///
/// Adding a second method under a key already present on the same side
/// replaces the earlier one. This only happens for malformed input.
#[derive(Debug, Default)]
pub struct Matcher {
    pairs: BTreeMap<MethodKey, MethodInfoPair>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_jvm(&mut self, method: MethodInfo) {
        let key = MethodKey::of(&method);
        let pair = self.pairs.entry(key).or_default();
        if pair.jvm.replace(method).is_some() {
            debug!("Duplicate jvm method, keeping the last one");
        }
    }

    pub fn add_dex(&mut self, method: MethodInfo) {
        let key = MethodKey::of(&method);
        let pair = self.pairs.entry(key).or_default();
        if pair.dex.replace(method).is_some() {
            debug!("Duplicate dex method, keeping the last one");
        }
    }

    /// Number of distinct keys seen on either side
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs whose key was seen on both sides, in key order
    pub fn matched(self) -> Vec<(MethodKey, MatchedPair)> {
        let total = self.pairs.len();
        let matched: Vec<_> = self
            .pairs
            .into_iter()
            .filter_map(|(key, pair)| match pair {
                MethodInfoPair {
                    jvm: Some(jvm),
                    dex: Some(dex),
                } => Some((key, MatchedPair { jvm, dex })),
                _ => None,
            })
            .collect();
        info!("Matched {} of {} methods", matched.len(), total);
        matched
    }
}

/// Match methods from the two formats by [`MethodKey`]
pub fn match_methods<J, D>(jvm: J, dex: D) -> Vec<(MethodKey, MatchedPair)>
where
    J: IntoIterator<Item = MethodInfo>,
    D: IntoIterator<Item = MethodInfo>,
{
    let mut matcher = Matcher::new();
    for method in jvm {
        matcher.add_jvm(method);
    }
    for method in dex {
        matcher.add_dex(method);
    }
    matcher.matched()
}
