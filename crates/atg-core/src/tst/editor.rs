//! Test-Script Editor: a streaming processor over the
//! test-script textual format. Three independent operations, each a
//! single pass over the input lines.

use std::collections::HashMap;

use regex::Regex;

use super::line::{base_key, TstLine};

const TEST_START_MARKER: &str = "TEST.UNIT";

fn lines_with_endings(content: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = content;
    while let Some(pos) = rest.find('\n') {
        lines.push(&rest[..=pos]);
        rest = &rest[pos + 1..];
    }
    if !rest.is_empty() {
        lines.push(rest);
    }
    lines
}

/// Collects, for each `SUBPROGRAM` seen in `src`, the set of
/// `ATTRIBUTES` lines that follow it (insertion-ordered, deduplicated),
/// then splices them into `dest` immediately before each `END` line that
/// closes a test for that subprogram. Subprograms absent from `src` pass
/// `dest`'s `END` through untouched.
pub fn merge_attributes(src: &str, dest: &str) -> String {
    let attributes = extract_attributes(src);

    let mut current_subprogram: Option<String> = None;
    let mut out = String::with_capacity(dest.len());

    for line in lines_with_endings(dest) {
        let tst_line = TstLine::new(line);
        if tst_line.is_subprogram() {
            current_subprogram = tst_line.field_after_first_colon().map(str::to_string);
        } else if tst_line.is_end() {
            if let Some(sp) = &current_subprogram {
                if let Some(attrs) = attributes.get(sp) {
                    for attr in attrs {
                        out.push_str(attr);
                        out.push('\n');
                    }
                }
            }
        }
        out.push_str(line);
    }
    out
}

fn extract_attributes(src: &str) -> HashMap<String, Vec<String>> {
    let mut result: HashMap<String, Vec<String>> = HashMap::new();
    let mut current_subprogram: Option<String> = None;

    for line in lines_with_endings(src) {
        let tst_line = TstLine::new(line);
        if tst_line.is_subprogram() {
            let sp = tst_line.field_after_first_colon().unwrap_or_default().to_string();
            result.entry(sp.clone()).or_default();
            current_subprogram = Some(sp);
        } else if tst_line.is_attribute() {
            if let Some(sp) = &current_subprogram {
                let trimmed = line.trim_end().to_string();
                let bucket = result.entry(sp.clone()).or_default();
                if !bucket.contains(&trimmed) {
                    bucket.push(trimmed);
                }
            }
        }
    }
    result
}

/// Drops any test whose `SUBPROGRAM` matches `subprogram_regex` and any
/// of whose lines match `content_regex`. Non-test text passes through
/// verbatim; if no test matches either pattern, the output equals the
/// input byte-for-byte.
pub fn remove_by_pattern(input: &str, subprogram_regex: &Regex, content_regex: &Regex) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_test = false;
    let mut skip_line = false;
    let mut subprogram_match = false;
    let mut pattern_match = false;
    let mut current_test: Vec<&str> = Vec::new();

    for line in lines_with_endings(input) {
        let tst_line = TstLine::new(line);

        if !in_test && line.starts_with(TEST_START_MARKER) {
            in_test = true;
            subprogram_match = false;
            pattern_match = false;
            current_test.clear();
        }

        if in_test {
            current_test.push(line);

            if tst_line.is_subprogram() {
                let subprogram = tst_line.field_after_first_colon().unwrap_or_default();
                subprogram_match = subprogram_regex.is_match(subprogram);
            }
            pattern_match = pattern_match || content_regex.is_match(line);
        }

        if in_test && tst_line.is_end() {
            if !(pattern_match && subprogram_match) {
                for test_line in &current_test {
                    out.push_str(test_line);
                }
            }
            in_test = false;
            skip_line = true;
        }

        if !in_test {
            if skip_line {
                skip_line = false;
            } else {
                out.push_str(line);
            }
        }
    }
    out
}

/// Per test, classifies every `VALUE`/`EXPECTED` dotted key belonging to
/// the test's own subprogram as internal or external, then drops any
/// `ATTRIBUTES` or `EXPECTED` line whose key is internal.
pub fn strip_unchanged(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_test = false;
    let mut skip_line = false;
    let mut current_test: Vec<&str> = Vec::new();
    let mut subprogram: Option<String> = None;
    // Sticky externality classification, keyed by base key.
    let mut external: HashMap<String, bool> = HashMap::new();

    for line in lines_with_endings(input) {
        let tst_line = TstLine::new(line);

        if !in_test && line.starts_with(TEST_START_MARKER) {
            in_test = true;
            current_test.clear();
            subprogram = None;
            external.clear();
        }

        if in_test {
            if tst_line.is_subprogram() {
                subprogram = tst_line.field_after_first_colon().map(str::to_string);
            }
            if let Some(sp) = &subprogram {
                if (tst_line.is_value() || tst_line.is_expected()) && tst_line.is_line_for_subprog(sp) {
                    if let Some(key) = tst_line.line_key() {
                        let base = base_key(key).to_string();
                        let is_external = tst_line.has_alloc_status()
                            || tst_line.has_deref()
                            || tst_line.is_global()
                            || tst_line.is_return();
                        // Sticky: once marked external, never flips back.
                        external
                            .entry(base)
                            .and_modify(|e| *e = *e || is_external)
                            .or_insert(is_external);
                    }
                }
            }
            current_test.push(line);
        }

        if in_test && tst_line.is_end() {
            for test_line in &current_test {
                let tl = TstLine::new(test_line);
                let drop = if tl.is_attribute() || tl.is_expected() {
                    tl.line_key()
                        .map(|k| !external.get(base_key(k)).copied().unwrap_or(false))
                        .unwrap_or(false)
                } else {
                    false
                };
                if !drop {
                    out.push_str(test_line);
                }
            }
            in_test = false;
            skip_line = true;
        }

        if !in_test {
            if skip_line {
                skip_line = false;
            } else {
                out.push_str(line);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_attributes_idempotent() {
        let src = "TEST.SUBPROGRAM:foo\nTEST.ATTRIBUTES:DISPLAY_STATE=DISPLAY\n";
        let dest = "TEST.UNIT:u\nTEST.SUBPROGRAM:foo\nTEST.END\n";
        let once = merge_attributes(src, dest);
        let twice = merge_attributes(src, &once);
        assert_eq!(once, twice);
        assert!(once.contains("TEST.ATTRIBUTES:DISPLAY_STATE=DISPLAY"));
    }

    #[test]
    fn merge_attributes_missing_subprogram_passes_through() {
        let src = "TEST.SUBPROGRAM:other\nTEST.ATTRIBUTES:X=1\n";
        let dest = "TEST.UNIT:u\nTEST.SUBPROGRAM:foo\nTEST.END\n";
        let merged = merge_attributes(src, dest);
        assert_eq!(merged, dest);
    }

    #[test]
    fn remove_by_pattern_stability_when_nothing_matches() {
        let input = "TEST.UNIT:u\nTEST.SUBPROGRAM:foo\nTEST.VALUE:u.foo.p:1\nTEST.END\n";
        let subprogram_re = Regex::new("nomatch").unwrap();
        let content_re = Regex::new("nomatch").unwrap();
        let output = remove_by_pattern(input, &subprogram_re, &content_re);
        assert_eq!(output, input);
    }

    #[test]
    fn remove_by_pattern_drops_matching_test_only() {
        let input = concat!(
            "TEST.UNIT:u\nTEST.SUBPROGRAM:foo\nTEST.VALUE:u.foo.p:1\nTEST.END\n",
            "TEST.UNIT:u\nTEST.SUBPROGRAM:bar\nTEST.VALUE:u.bar.p:1\nTEST.END\n",
        );
        let subprogram_re = Regex::new("^foo$").unwrap();
        let content_re = Regex::new("VALUE").unwrap();
        let output = remove_by_pattern(input, &subprogram_re, &content_re);
        assert!(!output.contains("foo"));
        assert!(output.contains("bar"));
    }

    #[test]
    fn s4_strip_unchanged_example() {
        let input = concat!(
            "TEST.UNIT:u\n",
            "TEST.SUBPROGRAM:f\n",
            "TEST.VALUE:u.f.p:3\n",
            "TEST.VALUE:u.f.q[0]:<<malloc 1>>\n",
            "TEST.ATTRIBUTES:u.f.p:ignored\n",
            "TEST.EXPECTED:u.f.p:x:3\n",
            "TEST.EXPECTED:u.f.q[0]:x:7\n",
            "TEST.END\n",
        );
        let out = strip_unchanged(input);
        assert!(!out.contains("TEST.EXPECTED:u.f.p:x:3"));
        assert!(!out.contains("TEST.ATTRIBUTES:u.f.p:ignored"));
        assert!(out.contains("TEST.EXPECTED:u.f.q[0]:x:7"));
        assert!(out.contains("TEST.VALUE:u.f.q[0]:<<malloc 1>>"));
    }
}
