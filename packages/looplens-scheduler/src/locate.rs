use rustc_hash::FxHashMap;

/// Maps a primitive call back to a source line by text search.
///
/// This is a heuristic, not a parse: the n-th time a signature is seen at
/// runtime is matched to the n-th source line containing it. Calls made from
/// loops, helper functions or with computed arguments often resolve to the
/// wrong line or to none at all.
pub struct LineLocator<'a> {
    lines: Vec<&'a str>,
    occurrences: FxHashMap<String, usize>,
}

impl<'a> LineLocator<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().collect(),
            occurrences: FxHashMap::default(),
        }
    }

    /// 1-based line of the `occurrence`-th (0-based) line containing `signature`.
    pub fn locate(&self, signature: &str, occurrence: usize) -> Option<usize> {
        let signature = signature.trim();
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.contains(signature))
            .nth(occurrence)
            .map(|(index, _)| index + 1)
    }

    /// Returns how many times `key` was seen before and bumps the counter.
    pub fn next_occurrence(&mut self, key: &str) -> usize {
        let count = self.occurrences.entry(key.to_string()).or_insert(0);
        let seen = *count;
        *count += 1;
        seen
    }

    /// Takes the next occurrence of `key` and tries each signature with it.
    pub fn resolve(&mut self, key: &str, signatures: &[String]) -> Option<usize> {
        let occurrence = self.next_occurrence(key);
        signatures
            .iter()
            .find_map(|signature| self.locate(signature, occurrence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "console.log('A');\nsetTimeout(() => {\n  console.log('A');\n}, 0);";

    #[test]
    fn test_repeated_signatures_resolve_to_successive_lines() {
        let mut locator = LineLocator::new(SOURCE);
        let sig = vec!["console.log('A')".to_string()];
        assert_eq!(locator.resolve("log-A", &sig), Some(1));
        assert_eq!(locator.resolve("log-A", &sig), Some(3));
        assert_eq!(locator.resolve("log-A", &sig), None);
    }

    #[test]
    fn test_missing_signature_is_none() {
        let locator = LineLocator::new(SOURCE);
        assert_eq!(locator.locate("queueMicrotask", 0), None);
        assert_eq!(locator.locate("  setTimeout ", 0), Some(2));
    }

    #[test]
    fn test_fallback_signatures_share_an_occurrence() {
        let mut locator = LineLocator::new("console.log(\"B\");\nconsole.log('B');");
        let sigs = vec!["console.log('B')".to_string(), "console.log(\"B\")".to_string()];
        // Occurrence 0 of the single-quoted form is line 2.
        assert_eq!(locator.resolve("log-B", &sigs), Some(2));
        // Occurrence 1 exists for neither form.
        assert_eq!(locator.resolve("log-B", &sigs), None);
    }
}
