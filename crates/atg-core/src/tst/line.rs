//! Per-line classification of the test-script textual format. A line is
//! classified by its `TEST.` prefix, and `VALUE`/`EXPECTED` lines carry a
//! *dotted key* of the form `unit.subprogram.field[.more]`.

use std::sync::OnceLock;

use regex::Regex;

fn array_index_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\d*\]").unwrap())
}

/// A single line of a `.tst` script, classified on demand.
#[derive(Debug, Clone)]
pub struct TstLine<'a> {
    pub raw: &'a str,
}

impl<'a> TstLine<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    pub fn is_value(&self) -> bool {
        self.raw.starts_with("TEST.VALUE:")
    }

    pub fn is_expected(&self) -> bool {
        self.raw.starts_with("TEST.EXPECTED:")
    }

    pub fn is_attribute(&self) -> bool {
        self.raw.starts_with("TEST.ATTRIBUTES:")
    }

    pub fn is_subprogram(&self) -> bool {
        self.raw.starts_with("TEST.SUBPROGRAM:")
    }

    pub fn is_name(&self) -> bool {
        self.raw.starts_with("TEST.NAME:")
    }

    pub fn is_unit(&self) -> bool {
        self.raw.starts_with("TEST.UNIT:")
    }

    pub fn is_end(&self) -> bool {
        self.raw.trim_end() == "TEST.END"
    }

    pub fn is_import_failures_start(&self) -> bool {
        self.raw.starts_with("TEST.IMPORT_FAILURES:")
    }

    pub fn is_import_failures_end(&self) -> bool {
        self.raw.starts_with("TEST.END_IMPORT_FAILURES")
    }

    /// The field after the first `:`, trimmed. Valid on `VALUE`,
    /// `EXPECTED`, `ATTRIBUTES`, `SUBPROGRAM`, `NAME`, and `UNIT` lines.
    pub fn field_after_first_colon(&self) -> Option<&'a str> {
        self.raw.splitn(2, ':').nth(1).map(str::trim)
    }

    /// The dotted key for a `VALUE`/`EXPECTED`/`ATTRIBUTES` line: the
    /// second colon-delimited field.
    pub fn line_key(&self) -> Option<&'a str> {
        debug_assert!(self.is_value() || self.is_expected() || self.is_attribute());
        self.raw.splitn(3, ':').nth(1).map(str::trim)
    }

    /// The value for a `VALUE`/`ATTRIBUTES` line (third colon field), or
    /// for `EXPECTED` its `something : value` tail taken whole.
    pub fn line_value(&self) -> Option<&'a str> {
        debug_assert!(self.is_value() || self.is_expected() || self.is_attribute());
        self.raw.splitn(3, ':').nth(2).map(str::trim)
    }

    /// True if the dotted key's second component (`unit.SUBPROGRAM.field`)
    /// matches `subprogram`.
    pub fn is_line_for_subprog(&self, subprogram: &str) -> bool {
        let Some(key) = self.line_key() else {
            return false;
        };
        key.split('.').nth(1).map(str::trim) == Some(subprogram)
    }

    /// True if the key path contains an array-index component `[n]`.
    pub fn has_deref(&self) -> bool {
        self.line_key()
            .map(|k| array_index_matcher().is_match(k))
            .unwrap_or(false)
    }

    /// True if the value is an allocation sentinel (`<<malloc…>>`,
    /// `<<null>>`).
    pub fn has_alloc_status(&self) -> bool {
        self.line_value()
            .map(|v| {
                let v = v.trim().to_lowercase();
                v.starts_with("<<malloc") || v == "<<null>>"
            })
            .unwrap_or(false)
    }

    /// True if the key names a global (`<<GLOBAL>>` appears in the key).
    pub fn is_global(&self) -> bool {
        self.line_key().map(|k| k.contains("<<GLOBAL>>")).unwrap_or(false)
    }

    /// True if the key's tail field (`unit.subprogram.field`) is `return`.
    pub fn is_return(&self) -> bool {
        self.line_key()
            .and_then(|k| k.split('.').nth(2))
            .map(|f| f.trim() == "return")
            .unwrap_or(false)
    }
}

/// A dotted key's base: the prefix before the first `[`.
pub fn base_key(key: &str) -> &str {
    key.split('[').next().unwrap_or(key)
}
