//! Locale-aware string ordering.
//!
//! A [`Collation`] descriptor configures how `$sort`, `$group` equality on
//! string keys and collation-aware expression operators compare strings. The
//! comparison itself lives behind the [`Collator`] trait so a full ICU-backed
//! implementation can be swapped in without touching any call site; the
//! built-in [`SimpleCollator`] covers the observable behaviors the engine
//! tests: strength-based case folding, `caseFirst` tie-breaks, `caseLevel`
//! and numeric ordering of digit runs.

use std::cmp::Ordering;

use serde::Deserialize;

/// Which case sorts first when a comparison is decided by case alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseFirst {
    Upper,
    Lower,
    #[default]
    Off,
}

/// Whether whitespace and punctuation take part in the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alternate {
    #[default]
    NonIgnorable,
    Shifted,
}

/// A collation descriptor, shaped like the document database option block.
///
/// `strength` runs 1–5: at strength 1 and 2 comparisons ignore case, from 3
/// upward they are case-sensitive. `numericOrdering` compares runs of digits
/// by numeric value rather than codepoint by codepoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Collation {
    pub locale: String,
    pub strength: u8,
    pub case_level: bool,
    pub case_first: CaseFirst,
    pub numeric_ordering: bool,
    pub alternate: Alternate,
    pub backwards: bool,
}

impl Default for Collation {
    fn default() -> Self {
        Collation {
            locale: "simple".to_string(),
            strength: 3,
            case_level: false,
            case_first: CaseFirst::Off,
            numeric_ordering: false,
            alternate: Alternate::NonIgnorable,
            backwards: false,
        }
    }
}

impl Collation {
    /// Builds the comparator for this descriptor.
    pub fn collator(&self) -> SimpleCollator {
        SimpleCollator { spec: self.clone() }
    }
}

/// A total order on strings.
pub trait Collator {
    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// A key string with the property that two inputs fold to the same key
    /// exactly when `compare` considers them equal. Used for hash-based
    /// grouping.
    fn sort_key(&self, s: &str) -> String;
}

/// Comparator derived directly from a [`Collation`] descriptor.
#[derive(Debug, Clone)]
pub struct SimpleCollator {
    spec: Collation,
}

/// A maximal run of either digits or non-digits.
enum Run<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn runs(s: &str) -> Vec<Run<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut digits = None;
    for (i, c) in s.char_indices() {
        let d = c.is_ascii_digit();
        match digits {
            None => digits = Some(d),
            Some(prev) if prev != d => {
                out.push(if prev { Run::Digits(&s[start..i]) } else { Run::Text(&s[start..i]) });
                start = i;
                digits = Some(d);
            }
            _ => {}
        }
    }
    if start < s.len() {
        match digits {
            Some(true) => out.push(Run::Digits(&s[start..])),
            _ => out.push(Run::Text(&s[start..])),
        }
    }
    out
}

fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let ta = a.trim_start_matches('0');
    let tb = b.trim_start_matches('0');
    ta.len()
        .cmp(&tb.len())
        .then_with(|| ta.cmp(tb))
        // more leading zeroes sorts first, keeping the order total
        .then_with(|| b.len().cmp(&a.len()))
}

impl SimpleCollator {
    fn strip_ignorable(&self, s: &str) -> String {
        s.chars()
            .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation())
            .collect()
    }

    /// The primary comparison level always folds case; strength decides
    /// whether case comes back as a tie-break.
    fn primary(&self, s: &str) -> String {
        let s = match self.spec.alternate {
            Alternate::Shifted => self.strip_ignorable(s),
            Alternate::NonIgnorable => s.to_string(),
        };
        s.to_lowercase()
    }

    fn case_tiebreak(&self, a: &str, b: &str) -> Ordering {
        // decided only when the case-folded forms are equal
        for (ca, cb) in a.chars().zip(b.chars()) {
            if ca == cb {
                continue;
            }
            let (ua, ub) = (ca.is_uppercase(), cb.is_uppercase());
            if ua != ub {
                return match self.spec.case_first {
                    CaseFirst::Upper => {
                        if ua {
                            Ordering::Less
                        } else {
                            Ordering::Greater
                        }
                    }
                    CaseFirst::Lower => {
                        if ua {
                            Ordering::Greater
                        } else {
                            Ordering::Less
                        }
                    }
                    CaseFirst::Off => ca.cmp(&cb),
                };
            }
            return ca.cmp(&cb);
        }
        a.len().cmp(&b.len())
    }

    fn cmp_text(&self, a: &str, b: &str) -> Ordering {
        let pa = self.primary(a);
        let pb = self.primary(b);
        let ord = pa.cmp(&pb);
        if ord != Ordering::Equal {
            return ord;
        }
        if self.spec.strength >= 3 || self.spec.case_level {
            self.case_tiebreak(a, b)
        } else {
            Ordering::Equal
        }
    }
}

impl Collator for SimpleCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        if !self.spec.numeric_ordering {
            return self.cmp_text(a, b);
        }
        let (ra, rb) = (runs(a), runs(b));
        for pair in ra.iter().zip(rb.iter()) {
            let ord = match pair {
                (Run::Digits(x), Run::Digits(y)) => cmp_digit_runs(x, y),
                (Run::Digits(_), Run::Text(_)) => Ordering::Less,
                (Run::Text(_), Run::Digits(_)) => Ordering::Greater,
                (Run::Text(x), Run::Text(y)) => self.cmp_text(x, y),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        ra.len().cmp(&rb.len())
    }

    fn sort_key(&self, s: &str) -> String {
        let mut key = String::new();
        if self.spec.numeric_ordering {
            for run in runs(s) {
                match run {
                    Run::Digits(d) => {
                        let t = d.trim_start_matches('0');
                        key.push_str(if t.is_empty() { "0" } else { t });
                        // leading zeroes break ties in compare(), so they
                        // must keep distinct keys as well
                        key.push('\u{2}');
                        key.push_str(&(d.len() - t.len()).to_string());
                    }
                    Run::Text(t) => key.push_str(&self.key_text(t)),
                }
            }
        } else {
            key = self.key_text(s);
        }
        key
    }
}

impl SimpleCollator {
    fn key_text(&self, s: &str) -> String {
        let p = self.primary(s);
        if self.spec.strength >= 3 || self.spec.case_level {
            // case participates in equality: keep the original casing too
            format!("{}\u{1}{}", p, s)
        } else {
            p
        }
    }
}
