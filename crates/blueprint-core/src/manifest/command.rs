use super::app::AppType;
use serde::de::value::MapAccessDeserializer;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

string_enum! {
    /// A command kind. The four known kinds form the canonical order; any
    /// other name is a user-declared extra that keeps its declared position.
    Command {
        Lint => "lint",
        Test => "test",
        Format => "format",
        Build => "build",
    }
}

impl Command {
    /// Canonical order in which defaults are synthesized.
    pub fn canonical() -> [Command; 4] {
        [Command::Lint, Command::Test, Command::Format, Command::Build]
    }
}

/// Default shell command for `command` on an app of type `app_type`.
pub fn default_command(app_type: &AppType, command: &Command) -> Option<&'static str> {
    match (app_type, command) {
        (AppType::Payload | AppType::SvelteKit, Command::Lint) => Some("pnpm lint"),
        (AppType::Payload | AppType::SvelteKit, Command::Test) => Some("pnpm test"),
        (AppType::Payload | AppType::SvelteKit, Command::Format) => Some("pnpm format"),
        (AppType::Payload | AppType::SvelteKit, Command::Build) => Some("pnpm build"),
        (AppType::Golang, Command::Lint) => Some("golangci-lint run"),
        (AppType::Golang, Command::Test) => Some("go test ./..."),
        (AppType::Golang, Command::Format) => Some("gofmt -w ."),
        (AppType::Golang, Command::Build) => Some("go build ./..."),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// CommandSpec
// ---------------------------------------------------------------------------

/// How one command runs.
///
/// Decodes from a boolean (`false` disables, `true` enables the default), a
/// string (the shell command), or `{command, skip_ci, timeout}`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub command: String,
    pub skip_ci: bool,
    pub timeout: Option<String>,
    pub disabled: bool,
}

impl CommandSpec {
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn run(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Enabled, has something to run, and is not excluded from CI.
    pub fn runs_in_ci(&self) -> bool {
        !self.disabled && !self.skip_ci && !self.command.trim().is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct FullSpec {
    #[serde(default)]
    command: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    skip_ci: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout: Option<String>,
}

impl Serialize for CommandSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.disabled {
            return serializer.serialize_bool(false);
        }
        FullSpec {
            command: self.command.clone(),
            skip_ci: self.skip_ci,
            timeout: self.timeout.clone(),
        }
        .serialize(serializer)
    }
}

struct CommandSpecVisitor;

impl<'de> Visitor<'de> for CommandSpecVisitor {
    type Value = CommandSpec;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean, a command string, or an object with `command`")
    }

    fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<CommandSpec, E> {
        Ok(CommandSpec {
            disabled: !v,
            ..CommandSpec::default()
        })
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<CommandSpec, E> {
        Ok(CommandSpec::run(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<CommandSpec, A::Error> {
        let full = FullSpec::deserialize(MapAccessDeserializer::new(map))?;
        Ok(CommandSpec {
            command: full.command,
            skip_ci: full.skip_ci,
            timeout: full.timeout,
            disabled: false,
        })
    }
}

impl<'de> Deserialize<'de> for CommandSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CommandSpecVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_all_three_shapes() {
        let off: CommandSpec = serde_json::from_str("false").unwrap();
        assert!(off.disabled);

        let on: CommandSpec = serde_json::from_str("true").unwrap();
        assert!(on.is_enabled());
        assert!(on.command.is_empty());

        let s: CommandSpec = serde_json::from_str(r#""make lint""#).unwrap();
        assert_eq!(s, CommandSpec::run("make lint"));

        let full: CommandSpec =
            serde_json::from_str(r#"{"command":"go test ./...","skip_ci":true,"timeout":"10m"}"#)
                .unwrap();
        assert_eq!(full.command, "go test ./...");
        assert!(full.skip_ci);
        assert_eq!(full.timeout.as_deref(), Some("10m"));
        assert!(!full.runs_in_ci());
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(serde_json::from_str::<CommandSpec>("42").is_err());
        assert!(serde_json::from_str::<CommandSpec>("[]").is_err());
    }

    #[test]
    fn serializes_to_a_decodable_shape() {
        for spec in [
            CommandSpec::disabled(),
            CommandSpec::run("pnpm lint"),
            CommandSpec {
                command: "pnpm test".into(),
                skip_ci: true,
                timeout: Some("5m".into()),
                disabled: false,
            },
        ] {
            let json = serde_json::to_string(&spec).unwrap();
            assert_eq!(serde_json::from_str::<CommandSpec>(&json).unwrap(), spec);
        }
        assert_eq!(serde_json::to_string(&CommandSpec::disabled()).unwrap(), "false");
    }

    #[test]
    fn default_table_covers_known_types() {
        assert_eq!(
            default_command(&AppType::Golang, &Command::Test),
            Some("go test ./...")
        );
        assert_eq!(
            default_command(&AppType::Payload, &Command::Format),
            Some("pnpm format")
        );
        assert_eq!(
            default_command(&AppType::Other("rails".into()), &Command::Lint),
            None
        );
        assert_eq!(
            default_command(&AppType::Golang, &Command::Other("generate".into())),
            None
        );
    }

    #[test]
    fn command_names_round_trip() {
        assert_eq!(Command::from("lint"), Command::Lint);
        assert_eq!(Command::from("generate").as_str(), "generate");
        assert_eq!(Command::canonical().map(|c| c.to_string()), ["lint", "test", "format", "build"]);
    }
}
