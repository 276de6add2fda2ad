//! Array-style child lookup.
//!
//! Children named `base[key]` form an array group under `base`. Keys that are purely numeric
//! are parsed as integers; anything else is kept as a string key.

use crate::{
    error::{RegError, RegResult},
    node::NodeHandle,
};
use core::fmt::{Display, Formatter};
use utils::{impl_conversion, impl_deref};

/// Key of one member of an array group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArrayKey {
    Index(u64),
    Key(String),
}

impl ArrayKey {
    pub fn parse(key: &str) -> ArrayKey {
        if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = key.parse::<u64>() {
                return ArrayKey::Index(index);
            }
        }
        ArrayKey::Key(key.into())
    }
}

impl Display for ArrayKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ArrayKey::Index(i) => write!(f, "{}", i),
            ArrayKey::Key(k) => f.write_str(k),
        }
    }
}

/// Members of an array group, in the order their children were added.
#[derive(Debug, Clone)]
pub struct ArrayGroup {
    inner: Vec<(ArrayKey, NodeHandle)>,
}
impl_deref!(ArrayGroup, Vec<(ArrayKey, NodeHandle)>);
impl_conversion!(ArrayGroup, Vec<(ArrayKey, NodeHandle)>);

impl ArrayGroup {
    pub fn get(&self, key: &ArrayKey) -> Option<&NodeHandle> {
        self.inner.iter().find(|(k, _)| k == key).map(|(_, n)| n)
    }

    pub fn index(&self, index: u64) -> Option<&NodeHandle> {
        self.get(&ArrayKey::Index(index))
    }

    pub fn keys(&self) -> Vec<ArrayKey> {
        self.inner.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Integer members in ascending order, followed by string members in insertion order.
    pub fn sorted(&self) -> Vec<NodeHandle> {
        let mut indexed: Vec<&(ArrayKey, NodeHandle)> = self
            .inner
            .iter()
            .filter(|(k, _)| matches!(k, ArrayKey::Index(_)))
            .collect();
        indexed.sort_by(|a, b| a.0.cmp(&b.0));
        indexed
            .into_iter()
            .chain(
                self.inner
                    .iter()
                    .filter(|(k, _)| matches!(k, ArrayKey::Key(_))),
            )
            .map(|(_, n)| n.clone())
            .collect()
    }

    fn max_index(&self) -> Option<u64> {
        self.inner
            .iter()
            .filter_map(|(k, _)| match k {
                ArrayKey::Index(i) => Some(*i),
                ArrayKey::Key(_) => None,
            })
            .max()
    }
}

/// Result of a lookup by name.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// A child with exactly the looked-up name.
    Node(NodeHandle),
    /// The array group named by the looked-up base name.
    Array(ArrayGroup),
}

/// Index part of an expression like `base[...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexExpr {
    Key(ArrayKey),
    /// `*` or `:`
    All,
    /// `start:stop` or `start:stop:step`, with Python slice semantics (exclusive stop).
    Slice {
        start: Option<u64>,
        stop: Option<u64>,
        step: u64,
    },
}

/// Split `base[key]` into `("base", "key")`. Returns `None` if `name` has no bracket suffix.
pub fn split_indexed(name: &str) -> Option<(&str, &str)> {
    let inner = name.strip_suffix(']')?;
    let open = inner.find('[')?;
    let key = &inner[open + 1..];
    if key.contains('[') || key.contains(']') {
        return None;
    }
    Some((&inner[..open], key))
}

/// Parse the text between brackets.
pub fn parse_index(expr: &str, index: &str) -> RegResult<IndexExpr> {
    let index = index.trim();
    if index == "*" {
        return Ok(IndexExpr::All);
    }
    if !index.contains(':') {
        return Ok(IndexExpr::Key(ArrayKey::parse(index)));
    }
    let invalid = || RegError::InvalidExpression { expr: expr.into() };
    let parts: Vec<&str> = index.split(':').map(str::trim).collect();
    if parts.len() > 3 {
        return Err(invalid());
    }
    let bound = |part: &str| -> RegResult<Option<u64>> {
        if part.is_empty() {
            Ok(None)
        } else {
            part.parse::<u64>().map(Some).map_err(|_| invalid())
        }
    };
    let start = bound(parts[0])?;
    let stop = bound(parts[1])?;
    let step = match parts.get(2) {
        Some(part) => bound(part)?.unwrap_or(1),
        None => 1,
    };
    if step == 0 {
        return Err(invalid());
    }
    if start.is_none() && stop.is_none() && step == 1 {
        return Ok(IndexExpr::All);
    }
    Ok(IndexExpr::Slice { start, stop, step })
}

/// Select members of `group` with `index`. Any index inside a slice without a member fails.
pub(crate) fn select(
    path: &str,
    expr: &str,
    group: &ArrayGroup,
    index: &IndexExpr,
) -> RegResult<Vec<NodeHandle>> {
    let missing = || RegError::NotFound {
        path: path.into(),
        name: expr.into(),
    };
    match index {
        IndexExpr::Key(key) => group.get(key).map(|n| vec![n.clone()]).ok_or_else(missing),
        IndexExpr::All => Ok(group.sorted()),
        IndexExpr::Slice { start, stop, step } => {
            let start = start.unwrap_or(0);
            let stop = match stop {
                Some(stop) => *stop,
                None => group.max_index().map_or(0, |max| max + 1),
            };
            let mut res = vec![];
            let mut next = Some(start);
            while let Some(i) = next.filter(|&i| i < stop) {
                res.push(group.index(i).cloned().ok_or_else(missing)?);
                next = i.checked_add(*step);
            }
            Ok(res)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_keys() {
        assert_eq!(ArrayKey::parse("12"), ArrayKey::Index(12));
        assert_eq!(ArrayKey::parse("ch-a"), ArrayKey::Key("ch-a".into()));
        assert_eq!(ArrayKey::parse(""), ArrayKey::Key("".into()));
    }

    #[test]
    fn split_bracket_suffix() {
        assert_eq!(split_indexed("adc[3]"), Some(("adc", "3")));
        assert_eq!(split_indexed("adc[0:2]"), Some(("adc", "0:2")));
        assert_eq!(split_indexed("adc"), None);
        assert_eq!(split_indexed("adc[1]x"), None);
    }

    #[test]
    fn slice_forms() {
        assert_eq!(parse_index("a[*]", "*"), Ok(IndexExpr::All));
        assert_eq!(parse_index("a[:]", ":"), Ok(IndexExpr::All));
        assert_eq!(
            parse_index("a[0:2]", "0:2"),
            Ok(IndexExpr::Slice {
                start: Some(0),
                stop: Some(2),
                step: 1
            })
        );
        assert_eq!(
            parse_index("a[::2]", "::2"),
            Ok(IndexExpr::Slice {
                start: None,
                stop: None,
                step: 2
            })
        );
        assert!(parse_index("a[x:2]", "x:2").is_err());
        assert!(parse_index("a[0:4:0]", "0:4:0").is_err());
    }
}
