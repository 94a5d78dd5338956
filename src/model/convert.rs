//! Pure helpers for container descriptor conversion (§4.2) and image-name
//! parsing. Kept free of any Docker client so they can be unit tested
//! directly; the async orchestration (inspecting a container to read its
//! environment) lives in [`crate::engine::client`].

use std::collections::HashMap;

const DISCARDED_ENV_KEYS: &[&str] = &["HOME", "DEBIAN_FRONTEND", "PATH"];
const CITADEL_TYPE_KEY: &str = "_citadel_type";
const CITADEL_LABELS_KEY: &str = "_citadel_labels";

/// Result of splitting a container's `KEY=VALUE` environment list into the
/// three buckets §4.2 recognizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitEnv {
    pub type_tag: String,
    pub labels: HashMap<String, String>,
    pub environment: HashMap<String, String>,
}

/// Splits a container's raw `KEY=VALUE` environment entries into a type tag,
/// label constraints, and the retained environment mapping.
///
/// `_citadel_type` sets the type tag; `_citadel_labels` is decoded as
/// comma-separated `key=value` pairs (the canonical encoding chosen in
/// SPEC_FULL §4.2); `HOME`/`DEBIAN_FRONTEND`/`PATH` are discarded; everything
/// else is retained verbatim. An entry with no `=` at all is skipped.
pub fn split_env<'a, I, S>(entries: I) -> SplitEnv
where
    I: IntoIterator<Item = &'a S>,
    S: AsRef<str> + 'a,
{
    let mut result = SplitEnv::default();

    for entry in entries {
        let entry = entry.as_ref();
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };

        match key {
            CITADEL_TYPE_KEY => result.type_tag = value.to_string(),
            CITADEL_LABELS_KEY => result.labels = decode_citadel_labels(value),
            k if DISCARDED_ENV_KEYS.contains(&k) => {}
            _ => {
                result.environment.insert(key.to_string(), value.to_string());
            }
        }
    }

    result
}

/// Decodes the canonical `_citadel_labels` value: comma-separated
/// `key=value` pairs. An entry with no `=` is skipped rather than treated as
/// a key with an empty value.
pub fn decode_citadel_labels(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// The two halves of an image reference: everything before the tag, and the
/// tag itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedImageName {
    pub name: String,
    pub tag: String,
}

/// Splits an image reference of the form `[registry[:port]/]repo[:tag]`.
///
/// The tag is delimited by the *last* `:` that occurs after the *last* `/`,
/// so a registry port (`registry.citadel.com:49153/foo:latest`) is not
/// mistaken for a tag separator.
pub fn parse_image_name(image: &str) -> ParsedImageName {
    let last_slash = image.rfind('/');
    let search_from = last_slash.map(|i| i + 1).unwrap_or(0);

    match image[search_from..].rfind(':') {
        Some(rel_colon) => {
            let colon = search_from + rel_colon;
            ParsedImageName {
                name: image[..colon].to_string(),
                tag: image[colon + 1..].to_string(),
            }
        }
        None => ParsedImageName {
            name: image.to_string(),
            tag: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_image_name_public_registry() {
        let parsed = parse_image_name("citadel/foo:latest");
        assert_eq!(parsed.name, "citadel/foo");
        assert_eq!(parsed.tag, "latest");
    }

    #[test]
    fn parse_image_name_custom_registry() {
        let parsed = parse_image_name("registry.citadel.com/foo:latest");
        assert_eq!(parsed.name, "registry.citadel.com/foo");
        assert_eq!(parsed.tag, "latest");
    }

    #[test]
    fn parse_image_name_custom_registry_with_port() {
        let parsed = parse_image_name("registry.citadel.com:49153/foo:latest");
        assert_eq!(parsed.name, "registry.citadel.com:49153/foo");
        assert_eq!(parsed.tag, "latest");
    }

    #[test]
    fn parse_image_name_no_tag() {
        let parsed = parse_image_name("registry.citadel.com:49153/foo");
        assert_eq!(parsed.name, "registry.citadel.com:49153/foo");
        assert_eq!(parsed.tag, "");
    }

    #[test]
    fn decode_citadel_labels_parses_key_value_pairs() {
        let labels = decode_citadel_labels("env=prod,rack=3");
        assert_eq!(labels.get("env").map(String::as_str), Some("prod"));
        assert_eq!(labels.get("rack").map(String::as_str), Some("3"));
    }

    #[test]
    fn decode_citadel_labels_skips_entries_without_equals() {
        let labels = decode_citadel_labels("env=prod,bogus,rack=3");
        assert_eq!(labels.len(), 2);
        assert!(!labels.contains_key("bogus"));
    }

    #[test]
    fn split_env_recognizes_reserved_keys() {
        let entries = vec![
            "_citadel_type=service".to_string(),
            "_citadel_labels=env=prod,rack=3".to_string(),
            "HOME=/root".to_string(),
            "DEBIAN_FRONTEND=noninteractive".to_string(),
            "PATH=/usr/bin".to_string(),
            "APP_ENV=staging".to_string(),
        ];

        let split = split_env(&entries);

        assert_eq!(split.type_tag, "service");
        assert_eq!(split.labels.get("env").map(String::as_str), Some("prod"));
        assert_eq!(split.environment.len(), 1);
        assert_eq!(
            split.environment.get("APP_ENV").map(String::as_str),
            Some("staging")
        );
    }

    #[test]
    fn split_env_skips_entries_with_no_equals_sign() {
        let entries = vec!["MALFORMED".to_string(), "OK=1".to_string()];
        let split = split_env(&entries);
        assert_eq!(split.environment.len(), 1);
    }
}
