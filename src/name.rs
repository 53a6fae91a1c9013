//! Domain names in canonical order.
//!
//! This module provides [`DomainName`], an absolute domain name kept as a
//! sequence of labels, together with the three operations a zone walk is
//! built on: turning user input into a name ([`DomainName::normalize`]),
//! ordering names the way DNSSEC does ([`compare`]), and finding the name
//! that immediately follows a given one ([`DomainName::increment`]).
//!
//! The order is the canonical DNS name order of [section 6.1 of RFC 4034]:
//! names are compared label by label starting with the most significant
//! label, i.e., the one closest to the root. Labels are compared as
//! unsigned octet sequences with ASCII letters lowercased. If one name
//! runs out of labels first, it sorts first. No other case folding or
//! collation is involved since labels are arbitrary octet sequences.
//!
//! [section 6.1 of RFC 4034]: https://tools.ietf.org/html/rfc4034#section-6.1

use std::cmp::Ordering;
use std::str::FromStr;
use std::vec::Vec;
use std::{fmt, hash};

use domain::base::cmp::CanonicalOrd;
use domain::base::name::{Name, ToLabelIter};

use crate::error::NameError;

//------------ Constants -----------------------------------------------------

/// The maximum length of a label in octets.
pub const MAX_LABEL_LEN: usize = 63;

/// The maximum length of an encoded domain name in octets.
pub const MAX_NAME_LEN: usize = 255;

/// The octet appended to a label to get the next possible label.
const NEXT_OCTET: u8 = 0x01;

//------------ DomainName ----------------------------------------------------

/// An absolute domain name.
///
/// The name keeps its labels starting with the least significant one, i.e.,
/// in the order they are written. The root label is implied and never
/// stored, so the root name itself has no labels at all. There are never
/// any empty labels and no label is longer than [`MAX_LABEL_LEN`] octets.
/// The encoded name including all length octets and the root label is at
/// most [`MAX_NAME_LEN`] octets long.
///
/// Labels keep the case they were created with. Comparisons, equality and
/// hashing ignore ASCII case, though. Use [`make_canonical`] to actually
/// lowercase a name.
///
/// [`make_canonical`]: DomainName::make_canonical
#[derive(Clone, Default)]
pub struct DomainName {
    labels: Vec<Vec<u8>>,
}

impl DomainName {
    /// Returns the root name.
    pub fn root() -> Self {
        Self::default()
    }

    /// Creates a name from a sequence of labels.
    ///
    /// The labels are given least significant first. Empty labels are
    /// skipped, so a trailing root label may or may not be present.
    pub fn from_labels<I, L>(labels: I) -> Result<Self, NameError>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        let mut res = Vec::new();
        let mut len = 1;
        for label in labels {
            let label = label.as_ref();
            if label.is_empty() {
                continue;
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(NameError::LongLabel);
            }
            len += label.len() + 1;
            if len > MAX_NAME_LEN {
                return Err(NameError::LongName);
            }
            res.push(label.to_vec());
        }
        Ok(DomainName { labels: res })
    }

    /// Creates a name from its presentation format.
    ///
    /// Labels are separated by dots. A backslash followed by three decimal
    /// digits is the octet with that value, a backslash followed by any
    /// other character is that character. Empty labels are dropped, so
    /// `"foo.com"`, `"foo.com."` and `".foo..com"` all result in the same
    /// fully qualified name `foo.com.`.
    pub fn normalize(s: &str) -> Result<Self, NameError> {
        Self::from_labels(split_labels(s)?)
    }

    /// Creates a name from any name of the `domain` crate.
    pub fn from_name<N: ToLabelIter + ?Sized>(
        name: &N,
    ) -> Result<Self, NameError> {
        Self::from_labels(name.iter_labels().map(|label| label.as_slice()))
    }

    /// Converts the name into a `domain` crate name.
    pub fn to_name(
        &self,
    ) -> Result<Name<Vec<u8>>, domain::base::name::NameError> {
        Name::from_octets(self.to_wire())
    }

    /// Returns the uncompressed wire format of the name.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut res = Vec::with_capacity(self.compose_len());
        for label in &self.labels {
            res.push(label.len() as u8);
            res.extend_from_slice(label);
        }
        res.push(0);
        res
    }

    /// Returns the length of the encoded name.
    pub fn compose_len(&self) -> usize {
        self.labels.iter().map(|label| label.len() + 1).sum::<usize>() + 1
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the number of labels, not counting the root label.
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Returns the least significant label unless this is the root.
    pub fn first_label(&self) -> Option<&[u8]> {
        self.labels.first().map(Vec::as_slice)
    }

    /// Returns an iterator over the labels, least significant first.
    ///
    /// The root label is not included.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &[u8]> + '_ {
        self.labels.iter().map(Vec::as_slice)
    }

    /// Returns whether `base` is a suffix of `self`, ignoring ASCII case.
    ///
    /// Every name ends with the root and with itself.
    pub fn ends_with(&self, base: &DomainName) -> bool {
        if base.labels.len() > self.labels.len() {
            return false;
        }
        self.labels
            .iter()
            .rev()
            .zip(base.labels.iter().rev())
            .all(|(left, right)| left.eq_ignore_ascii_case(right))
    }

    /// Returns a new name with `label` added in front.
    pub fn prepend(&self, label: &[u8]) -> Result<Self, NameError> {
        Self::from_labels(
            std::iter::once(label).chain(self.labels.iter().map(Vec::as_slice)),
        )
    }

    /// Lowercases all ASCII letters of the name.
    pub fn make_canonical(&mut self) {
        for label in &mut self.labels {
            label.make_ascii_lowercase()
        }
    }

    /// Returns a lowercased copy of the name.
    pub fn to_canonical(&self) -> Self {
        let mut res = self.clone();
        res.make_canonical();
        res
    }

    /// Returns the name that immediately follows this name.
    ///
    /// Only the least significant label is changed. If it is shorter than
    /// the maximum label length, the octet 1 is appended to it which gives
    /// the smallest label that is greater than the original one. A label
    /// of maximum length is instead incremented in place: trailing octets
    /// of value 255 are dropped and the last remaining octet is increased
    /// by one. Same happens if appending an octet would make the whole
    /// name too long. If the label consists of nothing but octets of value
    /// 255, there is nothing left to increment and
    /// [`NameError::Exhausted`] is returned.
    ///
    /// The root name is followed by `\001.`.
    ///
    /// The label never grows beyond [`MAX_LABEL_LEN`], so the result can
    /// always be sent in a query.
    pub fn increment(&self) -> Result<Self, NameError> {
        let mut res = self.clone();
        let grows = self.compose_len() < MAX_NAME_LEN;
        let first = match res.labels.first_mut() {
            Some(first) => first,
            None => return self.prepend(&[NEXT_OCTET]),
        };
        if first.len() < MAX_LABEL_LEN && grows {
            first.push(NEXT_OCTET);
            return Ok(res);
        }
        // Carry in canonical space: no upper case octets exist there.
        first.make_ascii_lowercase();
        while let Some(last) = first.pop() {
            if last != u8::MAX {
                let next = last + 1;
                first.push(if next.is_ascii_uppercase() {
                    b'Z' + 1
                } else {
                    next
                });
                return Ok(res);
            }
        }
        Err(NameError::Exhausted)
    }

    /// Returns an object that displays the name with a final dot.
    pub fn fmt_with_dot(&self) -> impl fmt::Display + '_ {
        DisplayWithDot(self)
    }
}

//------------ compare -------------------------------------------------------

/// Compares two names in canonical DNS name order.
///
/// See the [module documentation](self) for a description of the order.
pub fn compare(left: &DomainName, right: &DomainName) -> Ordering {
    let mut left = left.labels.iter().rev();
    let mut right = right.labels.iter().rev();
    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) => match label_cmp(l, r) {
                Ordering::Equal => {}
                other => return other,
            },
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
        }
    }
}

/// Compares two labels as octet sequences, ignoring ASCII case.
fn label_cmp(left: &[u8], right: &[u8]) -> Ordering {
    left.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(right.iter().map(u8::to_ascii_lowercase))
}

//--- PartialEq and Eq

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(other.labels.iter())
                .all(|(left, right)| left.eq_ignore_ascii_case(right))
    }
}

impl Eq for DomainName {}

//--- PartialOrd, Ord, and CanonicalOrd

impl PartialOrd for DomainName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DomainName {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl CanonicalOrd for DomainName {
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

//--- Hash

impl hash::Hash for DomainName {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        for label in &self.labels {
            (label.len() as u8).hash(state);
            for ch in label {
                ch.to_ascii_lowercase().hash(state)
            }
        }
    }
}

//--- FromStr

impl FromStr for DomainName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

//--- Display and Debug

impl fmt::Display for DomainName {
    /// Formats the name without the final dot.
    ///
    /// The root name is displayed as a single dot.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.labels.is_empty() {
            return f.write_str(".");
        }
        for (idx, label) in self.labels.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            fmt_label(label, f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DomainName({})", self.fmt_with_dot())
    }
}

struct DisplayWithDot<'a>(&'a DomainName);

impl fmt::Display for DisplayWithDot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_root() {
            f.write_str(".")
        } else {
            write!(f, "{}.", self.0)
        }
    }
}

fn fmt_label(label: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
    for &ch in label {
        if ch == b' ' || ch == b'.' || ch == b'\\' {
            write!(f, "\\{}", ch as char)?;
        } else if !(0x20..0x7F).contains(&ch) {
            write!(f, "\\{:03}", ch)?;
        } else {
            write!(f, "{}", ch as char)?;
        }
    }
    Ok(())
}

//------------ Helpers -------------------------------------------------------

/// Splits presentation format into unescaped labels.
///
/// Empty labels are kept, [`DomainName::from_labels`] drops them.
fn split_labels(s: &str) -> Result<Vec<Vec<u8>>, NameError> {
    let mut labels = Vec::new();
    let mut label = Vec::new();
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '.' => labels.push(std::mem::take(&mut label)),
            '\\' => {
                let first = chars.next().ok_or(NameError::BadEscape)?;
                match first.to_digit(10) {
                    Some(hundreds) => {
                        let tens = chars
                            .next()
                            .and_then(|ch| ch.to_digit(10))
                            .ok_or(NameError::BadEscape)?;
                        let ones = chars
                            .next()
                            .and_then(|ch| ch.to_digit(10))
                            .ok_or(NameError::BadEscape)?;
                        let value = hundreds * 100 + tens * 10 + ones;
                        let value = u8::try_from(value)
                            .map_err(|_| NameError::BadEscape)?;
                        label.push(value);
                    }
                    None => push_char(&mut label, first),
                }
            }
            _ => push_char(&mut label, ch),
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(NameError::LongLabel);
        }
    }
    labels.push(label);
    Ok(labels)
}

fn push_char(label: &mut Vec<u8>, ch: char) {
    let mut buf = [0; 4];
    label.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
}

//============ Testing =======================================================
