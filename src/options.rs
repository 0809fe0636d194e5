/// An ordered list of `NAME=VALUE` string options, as accepted by the
/// enumeration and creation operations.
///
/// Lookups are case-insensitive on the name, matching the conventions of
/// the client code this layer serves. An empty list is the common case and
/// allocates nothing.
#[derive(Clone, Debug, Default)]
pub struct OptionList {
    entries: Vec<(String, String)>,
}

impl OptionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_default<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Truthiness follows the usual option conventions: `YES`, `TRUE`, `ON`
    /// and `1` are true, everything else false.
    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some(v) => {
                v.eq_ignore_ascii_case("yes")
                    || v.eq_ignore_ascii_case("true")
                    || v.eq_ignore_ascii_case("on")
                    || v == "1"
            }
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        let opts = OptionList::new().set("COMPRESS", "DEFLATE").set("ZLEVEL", "6");
        assert_eq!(opts.get("compress"), Some("DEFLATE"));
        assert_eq!(opts.get_default("zlevel", "1"), "6");
        assert_eq!(opts.get_default("missing", "1"), "1");
    }

    #[test]
    fn test_bool() {
        let opts = OptionList::new()
            .set("UNLIMITED", "YES")
            .set("CHECKSUM", "0");
        assert!(opts.get_bool("UNLIMITED", false));
        assert!(!opts.get_bool("CHECKSUM", true));
        assert!(opts.get_bool("SHOW_COORDINATES", true));
    }
}
