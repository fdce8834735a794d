//! Wildcard match expressions used by the branch control tables.
//!
//! An expression is parsed from a *folded* pattern string. `_` matches exactly
//! one character, `%` matches any run of characters (including none), and a
//! backslash turns the following character into a literal.

/// How a field compares characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collation {
    /// Lowercased, with full-width ASCII forms mapped to plain ASCII.
    CaseInsensitive,
    Binary,
}

/// Longest folded field, in bytes, that may be stored in a pattern table.
pub const MAX_EXPRESSION_LEN: usize = 65535;

const FULL_WIDTH_START: u32 = 0xFF01;
const FULL_WIDTH_END: u32 = 0xFF5E;
const FULL_WIDTH_OFFSET: u32 = 0xFEE0;

fn push_normalized(out: &mut String, c: char, collation: Collation) {
    match collation {
        Collation::Binary => out.push(c),
        Collation::CaseInsensitive => {
            let code = c as u32;
            let c = if (FULL_WIDTH_START..=FULL_WIDTH_END).contains(&code) {
                char::from_u32(code - FULL_WIDTH_OFFSET).unwrap_or(c)
            } else {
                c
            };
            out.extend(c.to_lowercase());
        }
    }
}

/// Applies only the collation rules, leaving wildcards alone.
pub fn normalize(value: &str, collation: Collation) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        push_normalized(&mut out, c, collation);
    }
    out
}

/// Folds a raw pattern into its canonical form.
///
/// Runs of unescaped wildcards containing a `%` collapse to their `_`s
/// followed by a single `%`, so `%%` and `%_%` fold to `%` and `_%`.
/// Folding is idempotent.
pub fn fold(raw: &str, collation: Collation) -> String {
    let normalized = normalize(raw, collation);
    let mut out = String::with_capacity(normalized.len());
    let mut chars = normalized.chars().peekable();
    let mut singles = 0usize;
    let mut any_many = false;

    let flush = |out: &mut String, singles: &mut usize, any_many: &mut bool| {
        out.extend(std::iter::repeat_n('_', *singles));
        if *any_many {
            out.push('%');
        }
        *singles = 0;
        *any_many = false;
    };

    while let Some(c) = chars.next() {
        match c {
            '_' => singles += 1,
            '%' => any_many = true,
            '\\' => {
                flush(&mut out, &mut singles, &mut any_many);
                out.push('\\');
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            _ => {
                flush(&mut out, &mut singles, &mut any_many);
                out.push(c);
            }
        }
    }
    flush(&mut out, &mut singles, &mut any_many);
    out
}

/// Escapes wildcards and backslashes so `value` folds to a pattern matching
/// only itself.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Literal(char),
    AnyOne,
    AnyMany,
}

/// A parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchExpression {
    segments: Vec<Segment>,
}

impl MatchExpression {
    /// Parses a folded pattern. Parsing never fails; a trailing lone
    /// backslash is a literal backslash.
    pub fn parse(folded: &str) -> Self {
        let mut segments = Vec::with_capacity(folded.len());
        let mut chars = folded.chars();
        while let Some(c) = chars.next() {
            segments.push(match c {
                '_' => Segment::AnyOne,
                '%' => Segment::AnyMany,
                '\\' => Segment::Literal(chars.next().unwrap_or('\\')),
                c => Segment::Literal(c),
            });
        }
        Self { segments }
    }

    /// An expression matching exactly `value`, with no wildcards.
    pub fn literal(value: &str) -> Self {
        Self {
            segments: value.chars().map(Segment::Literal).collect(),
        }
    }

    /// Number of literal segments. Higher is more specific.
    pub fn specificity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Reports whether a concrete value matches this expression. The value is
    /// normalized with the field's collation first.
    pub fn matches(&self, value: &str, collation: Collation) -> bool {
        let chars: Vec<char> = normalize(value, collation).chars().collect();
        let segs = &self.segments;

        let (mut s, mut c) = (0usize, 0usize);
        let mut backtrack: Option<(usize, usize)> = None;
        while c < chars.len() {
            match segs.get(s) {
                Some(Segment::AnyMany) => {
                    backtrack = Some((s, c));
                    s += 1;
                    continue;
                }
                Some(Segment::AnyOne) => {
                    s += 1;
                    c += 1;
                    continue;
                }
                Some(Segment::Literal(l)) if *l == chars[c] => {
                    s += 1;
                    c += 1;
                    continue;
                }
                _ => {}
            }
            match backtrack {
                Some((star, from)) => {
                    s = star + 1;
                    c = from + 1;
                    backtrack = Some((star, from + 1));
                }
                None => return false,
            }
        }
        segs[s..].iter().all(|seg| *seg == Segment::AnyMany)
    }

    /// Reports whether every string `other` can match is also matched by
    /// `self`. May return false for some true covers, never true for a
    /// non-cover.
    pub fn covers(&self, other: &MatchExpression) -> bool {
        let a = &self.segments;
        let b = &other.segments;
        let width = b.len() + 1;
        let mut dp = vec![false; (a.len() + 1) * width];
        dp[0] = true;

        for i in 1..=a.len() {
            for j in 0..=b.len() {
                let covered = match a[i - 1] {
                    Segment::AnyMany => dp[(i - 1) * width + j] || (j > 0 && dp[i * width + j - 1]),
                    Segment::AnyOne => {
                        j > 0
                            && dp[(i - 1) * width + j - 1]
                            && matches!(b[j - 1], Segment::Literal(_) | Segment::AnyOne)
                    }
                    Segment::Literal(l) => {
                        j > 0 && dp[(i - 1) * width + j - 1] && b[j - 1] == Segment::Literal(l)
                    }
                };
                dp[i * width + j] = covered;
            }
        }
        dp[a.len() * width + b.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(raw: &str) -> MatchExpression {
        MatchExpression::parse(&fold(raw, Collation::CaseInsensitive))
    }

    #[test]
    fn test_fold_collapses_wildcard_runs() {
        let ci = Collation::CaseInsensitive;
        assert_eq!(fold("%%", ci), "%");
        assert_eq!(fold("%_%", ci), "_%");
        assert_eq!(fold("a%_%%_b", ci), "a__%b");
        assert_eq!(fold("__", ci), "__");
        assert_eq!(fold("\\%%", ci), "\\%%");
    }

    #[test]
    fn test_fold_applies_collation() {
        assert_eq!(fold("MaIn", Collation::CaseInsensitive), "main");
        assert_eq!(fold("MaIn", Collation::Binary), "MaIn");
        assert_eq!(fold("\u{FF21}\u{FF42}", Collation::CaseInsensitive), "ab");
    }

    #[test]
    fn test_fold_is_idempotent() {
        for raw in ["%_%x", "A\\_b%%", "trailing\\", "\\\\%", "__%_", "Ｍain%"] {
            for collation in [Collation::CaseInsensitive, Collation::Binary] {
                let once = fold(raw, collation);
                assert_eq!(fold(&once, collation), once, "raw: {raw}");
            }
        }
    }

    #[test]
    fn test_matches_wildcards() {
        let ci = Collation::CaseInsensitive;
        assert!(expr("%").matches("", ci));
        assert!(expr("%").matches("anything", ci));
        assert!(expr("feature/%").matches("Feature/Login", ci));
        assert!(!expr("feature/%").matches("main", ci));
        assert!(expr("v_").matches("v1", ci));
        assert!(!expr("v_").matches("v10", ci));
        assert!(expr("%a%b%").matches("xxaYYbzz", ci));
        assert!(!expr("%a%b%").matches("xxbYYazz", ci));
    }

    #[test]
    fn test_escaped_wildcards_are_literal() {
        let ci = Collation::CaseInsensitive;
        let e = expr("100\\%");
        assert!(e.matches("100%", ci));
        assert!(!e.matches("1000", ci));
        assert!(expr("a\\").matches("a\\", ci));
    }

    #[test]
    fn test_escape_matches_only_itself() {
        let e = expr(&escape("feat_1%"));
        assert!(e.matches("feat_1%", Collation::CaseInsensitive));
        assert!(!e.matches("featX1abc", Collation::CaseInsensitive));
        assert_eq!(e.specificity(), 7);
    }

    #[test]
    fn test_binary_collation_is_case_sensitive() {
        let e = MatchExpression::parse(&fold("Alice", Collation::Binary));
        assert!(e.matches("Alice", Collation::Binary));
        assert!(!e.matches("alice", Collation::Binary));
    }

    #[test]
    fn test_covers() {
        assert!(expr("%").covers(&expr("main")));
        assert!(expr("%").covers(&expr("_%")));
        assert!(expr("prefix1%").covers(&expr("prefix1sub%")));
        assert!(expr("prefix1%").covers(&expr("prefix1_")));
        assert!(!expr("prefix2_").covers(&expr("prefix2%")));
        assert!(expr("a_c").covers(&expr("abc")));
        assert!(!expr("abc").covers(&expr("a_c")));
        assert!(!expr("main").covers(&expr("dev")));
        assert!(expr("main").covers(&expr("main")));
    }

    #[test]
    fn test_specificity_counts_literals() {
        assert_eq!(expr("%").specificity(), 0);
        assert_eq!(expr("feat_%").specificity(), 4);
        assert_eq!(MatchExpression::literal("%x").specificity(), 2);
    }
}
