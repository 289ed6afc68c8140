//! Description of the host application's live state.
//!
//! The host keeps its configuration in one directory (`~/.claude`) and
//! records the signed-in identity in a JSON file with an `oauthAccount`
//! section: `~/.claude/.claude.json` when present, `~/.claude.json`
//! otherwise. Only the identity section is ever parsed; everything else is
//! copied as opaque bytes.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, SwapError};
use crate::util::fsops;

const OAUTH_SECTION: &str = "oauthAccount";

/// Identity fields read from the host's identity file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub email: Option<String>,
    pub account_uuid: Option<String>,
}

impl Identity {
    /// Label to register an account under.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.email.as_deref()
    }

    fn from_section(section: &Value) -> Self {
        let field = |name: &str| {
            section
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            email: field("emailAddress"),
            account_uuid: field("accountUuid"),
        }
    }
}

/// Paths of the host application's live state.
#[derive(Debug, Clone)]
pub struct HostLayout {
    /// Live configuration directory (snapshotted as a whole).
    pub config_dir: PathBuf,
    /// Identity file candidates, most specific first.
    pub identity_candidates: Vec<PathBuf>,
}

impl HostLayout {
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>, identity_candidates: Vec<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            identity_candidates,
        }
    }

    /// Identity file in use: the first candidate carrying an `oauthAccount`
    /// section, else the last candidate.
    #[must_use]
    pub fn identity_file(&self) -> Option<PathBuf> {
        self.identity_candidates
            .iter()
            .find(|path| matches!(read_json(path), Ok(Some(v)) if v.get(OAUTH_SECTION).is_some()))
            .or_else(|| self.identity_candidates.last())
            .cloned()
    }

    /// Identity file when it lives outside the config dir (and so is not
    /// covered by the directory snapshot).
    #[must_use]
    pub fn external_identity_file(&self) -> Option<PathBuf> {
        self.identity_file()
            .filter(|path| self.relative_to_config(path).is_none())
    }

    /// `path` relative to the config dir, if it is inside it.
    #[must_use]
    pub fn relative_to_config(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.config_dir)
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    /// Whether the live config dir exists.
    #[must_use]
    pub fn has_config_dir(&self) -> bool {
        self.config_dir.is_dir()
    }

    /// Signed-in identity, `None` when no file carries one.
    ///
    /// An unparsable identity file counts as "no identity": the host owns the
    /// file and cswap never fails an operation over its format.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        let path = self.identity_file()?;
        match read_json(&path) {
            Ok(Some(data)) => data
                .get(OAUTH_SECTION)
                .map(Identity::from_section)
                .filter(|id| id.email.is_some() || id.account_uuid.is_some()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable identity file");
                None
            }
        }
    }

    /// Raw `oauthAccount` section of the external identity file.
    pub fn external_identity_section(&self) -> Result<Option<Value>> {
        let Some(path) = self.external_identity_file() else {
            return Ok(None);
        };
        Ok(read_json(&path)?.and_then(|mut v| v.get_mut(OAUTH_SECTION).map(Value::take)))
    }

    /// Replace the `oauthAccount` section of the external identity file,
    /// keeping every other key.
    pub fn write_external_identity_section(&self, section: &Value) -> Result<()> {
        let Some(path) = self.external_identity_file() else {
            return Ok(());
        };
        let mut data = read_json(&path)?.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let Some(object) = data.as_object_mut() else {
            return Err(SwapError::corrupt(&path, "identity file is not a JSON object"));
        };
        object.insert(OAUTH_SECTION.to_string(), section.clone());

        let bytes = serde_json::to_vec_pretty(&data)?;
        fsops::write_atomic(&path, &bytes, None).map_err(|e| SwapError::io_at(&path, e))?;
        tracing::debug!(path = %path.display(), "Updated host identity section");
        Ok(())
    }
}

fn read_json(path: &Path) -> Result<Option<Value>> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(None),
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SwapError::corrupt(path, e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SwapError::io_at(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(home: &Path) -> HostLayout {
        HostLayout::new(
            home.join(".claude"),
            vec![home.join(".claude/.claude.json"), home.join(".claude.json")],
        )
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn primary_identity_file_wins_when_it_has_oauth_section() {
        let home = tempfile::tempdir().unwrap();
        write(
            &home.path().join(".claude/.claude.json"),
            r#"{"oauthAccount":{"emailAddress":"a@x.com","accountUuid":"u-1"}}"#,
        );
        write(
            &home.path().join(".claude.json"),
            r#"{"oauthAccount":{"emailAddress":"other@x.com"}}"#,
        );

        let host = layout(home.path());
        let identity = host.identity().unwrap();
        assert_eq!(identity.label(), Some("a@x.com"));
        assert_eq!(identity.account_uuid.as_deref(), Some("u-1"));
        assert!(host.external_identity_file().is_none());
    }

    #[test]
    fn falls_back_to_home_identity_file() {
        let home = tempfile::tempdir().unwrap();
        write(&home.path().join(".claude/.claude.json"), r#"{"theme":"dark"}"#);
        write(
            &home.path().join(".claude.json"),
            r#"{"oauthAccount":{"emailAddress":"b@x.com"}}"#,
        );

        let host = layout(home.path());
        assert_eq!(host.identity().unwrap().label(), Some("b@x.com"));
        assert_eq!(
            host.external_identity_file(),
            Some(home.path().join(".claude.json"))
        );
    }

    #[test]
    fn empty_email_is_no_label() {
        let home = tempfile::tempdir().unwrap();
        write(
            &home.path().join(".claude/.claude.json"),
            r#"{"oauthAccount":{"emailAddress":"","accountUuid":"uuid"}}"#,
        );

        let identity = layout(home.path()).identity().unwrap();
        assert_eq!(identity.label(), None);
        assert_eq!(identity.account_uuid.as_deref(), Some("uuid"));
    }

    #[test]
    fn malformed_identity_file_is_ignored() {
        let home = tempfile::tempdir().unwrap();
        write(&home.path().join(".claude.json"), "{not json");
        assert!(layout(home.path()).identity().is_none());
    }

    #[test]
    fn external_section_merge_keeps_other_keys() {
        let home = tempfile::tempdir().unwrap();
        write(
            &home.path().join(".claude.json"),
            r#"{"numStartups":4,"oauthAccount":{"emailAddress":"a@x.com"}}"#,
        );
        let host = layout(home.path());

        let section = serde_json::json!({"emailAddress": "b@x.com"});
        host.write_external_identity_section(&section).unwrap();

        let data: Value =
            serde_json::from_slice(&std::fs::read(home.path().join(".claude.json")).unwrap())
                .unwrap();
        assert_eq!(data["numStartups"], 4);
        assert_eq!(data["oauthAccount"]["emailAddress"], "b@x.com");
        assert_eq!(host.external_identity_section().unwrap(), Some(section));
    }
}
