//! URL templates.
//!
//! Long URLs repeated across many byte range references are replaced by a `{{name}}` placeholder and a single `templates` entry.

use std::collections::{BTreeMap, HashMap};

use super::{ManifestReference, ReferenceManifest};

/// A URL must occur at least this many times to be replaced by a template.
pub const TEMPLATE_MIN_OCCURRENCES: usize = 5;

/// Substitute every `{{name}}` placeholder in `location` with its template.
///
/// Placeholders without a matching template are left unchanged.
#[must_use]
pub fn apply_templates(location: &str, templates: &BTreeMap<String, String>) -> String {
    if templates.is_empty() || !location.contains("{{") {
        return location.to_string();
    }
    let mut resolved = String::with_capacity(location.len());
    let mut rest = location;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let name = &rest[start + 2..start + 2 + len];
        resolved.push_str(&rest[..start]);
        match templates.get(name) {
            Some(url) => resolved.push_str(url),
            None => resolved.push_str(&rest[start..start + 4 + len]),
        }
        rest = &rest[start + 4 + len..];
    }
    resolved.push_str(rest);
    resolved
}

fn is_url(location: &str) -> bool {
    location.contains("://")
}

impl ReferenceManifest {
    /// Expand all templates and remove them from the manifest.
    ///
    /// Afterwards every byte range location is a literal URL or path.
    pub fn remove_templates(&mut self) {
        if self.templates.is_empty() {
            return;
        }
        let templates = std::mem::take(&mut self.templates);
        for reference in self.refs.values_mut() {
            if let ManifestReference::ByteRange(reference) = reference {
                reference.location = apply_templates(&reference.location, &templates);
            }
        }
    }

    /// Introduce a template for every URL occurring at least [`TEMPLATE_MIN_OCCURRENCES`] times.
    ///
    /// Existing templates are expanded first. New templates are named `u1`, `u2`, ... in order of first appearance.
    pub fn extract_templates(&mut self) {
        self.remove_templates();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut first_seen: Vec<&str> = Vec::new();
        for reference in self.refs.values() {
            if let ManifestReference::ByteRange(reference) = reference {
                if is_url(&reference.location) {
                    let count = counts.entry(reference.location.as_str()).or_insert(0);
                    if *count == 0 {
                        first_seen.push(reference.location.as_str());
                    }
                    *count += 1;
                }
            }
        }

        let url_to_name: HashMap<String, String> = first_seen
            .into_iter()
            .filter(|url| counts[url] >= TEMPLATE_MIN_OCCURRENCES)
            .enumerate()
            .map(|(i, url)| (url.to_string(), format!("u{}", i + 1)))
            .collect();
        if url_to_name.is_empty() {
            return;
        }

        for reference in self.refs.values_mut() {
            if let ManifestReference::ByteRange(reference) = reference {
                if let Some(name) = url_to_name.get(&reference.location) {
                    reference.location = format!("{{{{{name}}}}}");
                }
            }
        }
        self.templates = url_to_name
            .into_iter()
            .map(|(url, name)| (name, url))
            .collect();
    }
}
