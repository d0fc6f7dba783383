//! Random strings matching a regular expression
//!
//! Patterns are parsed with `regex-syntax` and handed to proptest's regex
//! strategy, which is driven by a `TestRunner` seeded from the caller's RNG.
//! A leading `^` and trailing `$` are stripped before parsing; any other
//! anchor or word boundary is rejected. Unbounded repetitions (`*`, `+`,
//! `{n,}`) repeat at most `limit` extra times.

use proptest::strategy::{Strategy, ValueTree};
use proptest::string::{RegexGeneratorStrategy, string_regex_parsed};
use proptest::test_runner::{Config as ProptestConfig, RngAlgorithm, TestRng, TestRunner};
use rand::Rng;
use regex_syntax::ParserBuilder;
use regex_syntax::hir::{Capture, Class, Hir, HirKind, Repetition};

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("{0}")]
    Syntax(#[from] Box<regex_syntax::Error>),
    #[error("pattern uses word boundary escapes which are unsupported for string generation")]
    Boundary,
    #[error("pattern contains a class that matches nothing")]
    EmptyClass,
    #[error("{0}")]
    Unsupported(String),
}

/// A parsed pattern ready to produce matching strings.
#[derive(Debug)]
pub struct PatternGenerator {
    strategy: RegexGeneratorStrategy<String>,
}

impl PatternGenerator {
    /// Parse `pattern`, capping unbounded repetitions at `limit` extra repeats.
    ///
    /// # Errors
    ///
    /// Fails for patterns `regex-syntax` rejects, for boundary assertions
    /// other than the outer `^` / `$`, and for classes that match nothing.
    pub fn new(pattern: &str, limit: u32) -> Result<Self, PatternError> {
        let normalized = strip_anchors(pattern)?;
        let hir = ParserBuilder::new()
            .build()
            .parse(normalized)
            .map_err(Box::new)?;
        let strategy = string_regex_parsed(&cap_repetitions(&hir, limit)?)
            .map_err(|e| PatternError::Unsupported(e.to_string()))?;
        Ok(Self { strategy })
    }

    /// Draw one matching string.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Unsupported`] if the strategy rejects the draw.
    pub fn generate(&self, rng: &mut impl Rng) -> Result<String, PatternError> {
        let mut runner = seeded_runner(rng);
        self.strategy
            .new_tree(&mut runner)
            .map(|tree| tree.current())
            .map_err(|reason| PatternError::Unsupported(reason.message().to_string()))
    }
}

/// Generate one string matching `pattern`.
///
/// # Errors
///
/// See [`PatternGenerator::new`].
pub fn generate(pattern: &str, limit: u32, rng: &mut impl Rng) -> Result<String, PatternError> {
    PatternGenerator::new(pattern, limit)?.generate(rng)
}

fn seeded_runner(rng: &mut impl Rng) -> TestRunner {
    let config = ProptestConfig {
        rng_algorithm: RngAlgorithm::ChaCha,
        ..ProptestConfig::default()
    };
    let mut seed = [0u8; 32];
    rng.fill(&mut seed);
    let test_rng = TestRng::from_seed(config.rng_algorithm, &seed);
    TestRunner::new_with_rng(config, test_rng)
}

fn strip_anchors(pattern: &str) -> Result<&str, PatternError> {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if matches!(bytes.get(i + 1), Some(b'b' | b'B' | b'A' | b'Z' | b'z' | b'G')) {
                return Err(PatternError::Boundary);
            }
            i += 2;
        } else {
            i += 1;
        }
    }

    let start = usize::from(bytes.first() == Some(&b'^'));
    let mut end = bytes.len();
    if end > start && bytes[end - 1] == b'$' && !is_escaped(bytes, end - 1) {
        end -= 1;
    }
    Ok(&pattern[start..end])
}

fn is_escaped(bytes: &[u8], idx: usize) -> bool {
    bytes[..idx].iter().rev().take_while(|&&b| b == b'\\').count() % 2 == 1
}

/// Rebuild `hir` with every unbounded repetition given a maximum.
fn cap_repetitions(hir: &Hir, limit: u32) -> Result<Hir, PatternError> {
    Ok(match hir.kind() {
        HirKind::Class(Class::Unicode(class)) if class.ranges().is_empty() => {
            return Err(PatternError::EmptyClass);
        }
        HirKind::Class(Class::Bytes(class)) if class.ranges().is_empty() => {
            return Err(PatternError::EmptyClass);
        }
        HirKind::Repetition(rep) => Hir::repetition(Repetition {
            min: rep.min,
            max: Some(rep.max.unwrap_or_else(|| rep.min.saturating_add(limit))),
            greedy: rep.greedy,
            sub: Box::new(cap_repetitions(&rep.sub, limit)?),
        }),
        HirKind::Capture(capture) => Hir::capture(Capture {
            index: capture.index,
            name: capture.name.clone(),
            sub: Box::new(cap_repetitions(&capture.sub, limit)?),
        }),
        HirKind::Concat(parts) => Hir::concat(
            parts
                .iter()
                .map(|p| cap_repetitions(p, limit))
                .collect::<Result<_, _>>()?,
        ),
        HirKind::Alternation(branches) => Hir::alternation(
            branches
                .iter()
                .map(|b| cap_repetitions(b, limit))
                .collect::<Result<_, _>>()?,
        ),
        _ => hir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    #[test]
    fn literal() {
        assert_eq!(generate("abc", 5, &mut rng()).unwrap(), "abc");
    }

    #[test]
    fn outer_anchors_are_stripped() {
        assert_eq!(generate("^ok$", 5, &mut rng()).unwrap(), "ok");
        assert_eq!(generate(r"^cost\$$", 5, &mut rng()).unwrap(), "cost$");
    }

    #[test]
    fn inner_anchor_is_rejected() {
        assert!(matches!(
            generate("a^b", 5, &mut rng()),
            Err(PatternError::Unsupported(_))
        ));
    }

    #[test]
    fn word_boundary_is_rejected() {
        assert!(matches!(
            generate(r"\bword\b", 5, &mut rng()),
            Err(PatternError::Boundary)
        ));
        // escaped backslash followed by a plain `b`
        assert_eq!(generate(r"\\b", 5, &mut rng()).unwrap(), r"\b");
    }

    #[test]
    fn digit_range() {
        let mut rng = rng();
        for _ in 0..100 {
            let s = generate("id-[0-9]+", 5, &mut rng).unwrap();
            let digits = s.strip_prefix("id-").unwrap();
            assert!(!digits.is_empty() && digits.len() <= 6, "{s}");
            assert!(digits.chars().all(|c| c.is_ascii_digit()), "{s}");
        }
    }

    #[test]
    fn bounded_repetition() {
        let mut rng = rng();
        for _ in 0..100 {
            let s = generate("[a-c]{2,4}", 5, &mut rng).unwrap();
            assert!((2..=4).contains(&s.len()), "{s}");
            assert!(s.chars().all(|c| ('a'..='c').contains(&c)));
        }
    }

    #[test]
    fn star_may_be_empty_and_is_limited() {
        let mut rng = rng();
        let lengths: Vec<usize> = (0..200)
            .map(|_| generate("x*", 3, &mut rng).unwrap().len())
            .collect();
        assert!(lengths.iter().all(|&n| n <= 3));
        assert!(lengths.contains(&0));
    }

    #[test]
    fn alternation_picks_a_branch() {
        let mut rng = rng();
        for _ in 0..50 {
            let s = generate("^(cat|dog)s?$", 5, &mut rng).unwrap();
            assert!(["cat", "dog", "cats", "dogs"].contains(&s.as_str()), "{s}");
        }
    }

    #[test]
    fn dot_is_one_char_without_newline() {
        let mut rng = rng();
        for _ in 0..100 {
            let s = generate(".", 1, &mut rng).unwrap();
            assert_eq!(s.chars().count(), 1);
            assert_ne!(s, "\n");
        }
    }

    #[test]
    fn non_ascii_class() {
        let s = generate("[é-ë]", 1, &mut rng()).unwrap();
        assert!(('é'..='ë').contains(&s.chars().next().unwrap()));
    }

    #[test]
    fn same_seed_same_string() {
        let generator = PatternGenerator::new("[a-z]{12}", 5).unwrap();
        let a = generator.generate(&mut rng()).unwrap();
        let b = generator.generate(&mut rng()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_class_is_rejected() {
        assert!(matches!(
            generate("[a&&b]", 5, &mut rng()),
            Err(PatternError::EmptyClass)
        ));
    }

    #[test]
    fn invalid_pattern() {
        assert!(matches!(
            generate("([a-", 5, &mut rng()),
            Err(PatternError::Syntax(_))
        ));
    }
}
