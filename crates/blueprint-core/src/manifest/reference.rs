//! `resource.output` references from env values, and the per-type output
//! catalogs they are checked against.

use super::resource::ResourceType;
use regex::Regex;
use std::sync::OnceLock;

const POSTGRES_OUTPUTS: &[&str] = &[
    "connection_url",
    "id",
    "urn",
    "host",
    "port",
    "database",
    "user",
    "password",
];

const S3_OUTPUTS: &[&str] = &[
    "bucket_name",
    "bucket_url",
    "endpoint",
    "id",
    "region",
    "urn",
    "access_key",
    "secret_key",
];

const SQLITE_OUTPUTS: &[&str] = &["connection_url", "id", "host", "database", "auth_token"];

pub fn output_catalog(resource_type: &ResourceType) -> &'static [&'static str] {
    match resource_type {
        ResourceType::Postgres => POSTGRES_OUTPUTS,
        ResourceType::S3 => S3_OUTPUTS,
        ResourceType::Sqlite => SQLITE_OUTPUTS,
        ResourceType::Other(_) => &[],
    }
}

static REFERENCE_RE: OnceLock<Regex> = OnceLock::new();

fn reference_re() -> &'static Regex {
    REFERENCE_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_-]*)\.([A-Za-z_][A-Za-z0-9_-]*)$").unwrap()
    })
}

/// A parsed `name.output` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRef<'a> {
    pub resource: &'a str,
    pub output: &'a str,
}

/// Split `db.connection_url` into its resource and output names. Returns
/// `None` unless the input is exactly two identifiers joined by one dot.
pub fn parse_resource_reference(s: &str) -> Option<ResourceRef<'_>> {
    let caps = reference_re().captures(s)?;
    Some(ResourceRef {
        resource: caps.get(1)?.as_str(),
        output: caps.get(2)?.as_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_references() {
        let r = parse_resource_reference("db.connection_url").unwrap();
        assert_eq!(r.resource, "db");
        assert_eq!(r.output, "connection_url");
        let r = parse_resource_reference("media-bucket.bucket_url").unwrap();
        assert_eq!(r.resource, "media-bucket");
    }

    #[test]
    fn rejects_malformed_references() {
        for s in ["", "db", "db.", ".url", "db.a.b", "1db.url", "db.url extra", "db .url"] {
            assert!(parse_resource_reference(s).is_none(), "should reject {s:?}");
        }
    }

    #[test]
    fn catalogs_are_type_specific() {
        assert!(output_catalog(&ResourceType::Postgres).contains(&"password"));
        assert!(output_catalog(&ResourceType::S3).contains(&"secret_key"));
        assert!(output_catalog(&ResourceType::Sqlite).contains(&"auth_token"));
        assert!(output_catalog(&ResourceType::Other("redis".into())).is_empty());
    }
}
