//! Temporary Firefox profile with the automation extension installed.
//!
//! A profile is created fresh for every launch and deleted on drop. The
//! host application's own state lives in its local storage, which the
//! session store snapshots separately, so nothing here needs to persist.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, from_str};
use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{Error, Result};

use super::options::BrowserOptions;

// ============================================================================
// Constants
// ============================================================================

/// Header comment for `user.js`.
const USER_JS_HEADER: &str = "// whatslogged automation profile\n\n";

// ============================================================================
// Preferences
// ============================================================================

/// A `user.js` preference value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i32),
    /// String value.
    Str(String),
}

impl PrefValue {
    /// Formats the value as a JavaScript literal.
    fn to_js(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            // serde_json string literals are valid JavaScript string literals.
            Self::Str(s) => Value::String(s.clone()).to_string(),
        }
    }
}

/// One `user_pref("key", value);` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pref {
    /// Preference name.
    pub key: &'static str,
    /// Preference value.
    pub value: PrefValue,
}

impl Pref {
    const fn flag(key: &'static str, value: bool) -> Self {
        Self {
            key,
            value: PrefValue::Bool(value),
        }
    }

    const fn int(key: &'static str, value: i32) -> Self {
        Self {
            key,
            value: PrefValue::Int(value),
        }
    }

    fn text(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: PrefValue::Str(value.into()),
        }
    }

    /// Renders the `user.js` line.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("user_pref(\"{}\", {});", self.key, self.value.to_js())
    }
}

// ============================================================================
// ExtensionSource
// ============================================================================

/// Where the automation extension comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionSource {
    /// Directory containing `manifest.json`.
    Unpacked(PathBuf),
    /// `.xpi` or `.zip` archive.
    Packed(PathBuf),
}

impl ExtensionSource {
    /// Returns the source path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Unpacked(path) | Self::Packed(path) => path,
        }
    }
}

impl From<PathBuf> for ExtensionSource {
    /// Directories are unpacked sources, anything else is an archive.
    fn from(path: PathBuf) -> Self {
        if path.is_dir() {
            Self::Unpacked(path)
        } else {
            Self::Packed(path)
        }
    }
}

// ============================================================================
// Profile
// ============================================================================

/// A temporary Firefox profile directory, removed on drop.
pub struct Profile {
    /// Keeps the directory alive.
    _temp_dir: TempDir,
    /// Path to the profile directory.
    path: PathBuf,
}

impl Profile {
    /// Creates an empty temporary profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] if the directory cannot be created.
    pub fn new_temp() -> Result<Self> {
        let temp_dir = TempDir::with_prefix("whatslogged-profile-")
            .map_err(|e| Error::profile(format!("Failed to create temp profile: {e}")))?;
        let path = temp_dir.path().to_path_buf();
        debug!(path = %path.display(), "Created temporary profile");

        Ok(Self {
            _temp_dir: temp_dir,
            path,
        })
    }

    /// Creates a profile ready for `options`: extension installed and
    /// preferences written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] if any step fails.
    pub fn prepare(extension: &ExtensionSource, options: &BrowserOptions) -> Result<Self> {
        let profile = Self::new_temp()?;
        profile.install_extension(extension)?;
        profile.write_prefs(&Self::prefs_for(options))?;
        Ok(profile)
    }

    /// Returns the path to the profile directory.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Preferences for an automation session.
    ///
    /// Unsigned extensions allowed, quiet startup, no telemetry or updates,
    /// plus the user-agent override when `options` carries one.
    #[must_use]
    pub fn prefs_for(options: &BrowserOptions) -> Vec<Pref> {
        let mut prefs = vec![
            // Extension support
            Pref::flag("xpinstall.signatures.required", false),
            Pref::int("extensions.autoDisableScopes", 0),
            Pref::text("extensions.webextensions.restrictedDomains", ""),
            Pref::flag("security.data_uri.block_toplevel_data_uri_navigations", false),
            // Quiet startup
            Pref::int("browser.startup.page", 0),
            Pref::flag("browser.shell.checkDefaultBrowser", false),
            Pref::text("browser.startup.homepage_override.mstone", "ignore"),
            Pref::flag("browser.sessionstore.resume_from_crash", false),
            Pref::int("toolkit.startup.max_resumed_crashes", -1),
            Pref::flag("browser.warnOnQuit", false),
            Pref::flag("browser.aboutConfig.showWarning", false),
            Pref::flag("browser.uitour.enabled", false),
            Pref::text("startup.homepage_welcome_url", ""),
            Pref::text("startup.homepage_override_url", ""),
            // Telemetry
            Pref::flag("toolkit.telemetry.enabled", false),
            Pref::flag("toolkit.telemetry.unified", false),
            Pref::flag("toolkit.telemetry.archive.enabled", false),
            Pref::flag("datareporting.policy.dataSubmissionEnabled", false),
            Pref::flag("datareporting.healthreport.uploadEnabled", false),
            // Updates and background services
            Pref::flag("app.update.staging.enabled", false),
            Pref::flag("extensions.update.enabled", false),
            Pref::flag("app.normandy.enabled", false),
            Pref::flag("browser.safebrowsing.malware.enabled", false),
            Pref::flag("browser.safebrowsing.phishing.enabled", false),
            Pref::flag("network.captive-portal-service.enabled", false),
            // The host plays notification sounds and asks for push permission.
            Pref::flag("dom.push.enabled", false),
            Pref::int("permissions.default.desktop-notification", 2),
        ];

        if let Some(user_agent) = &options.user_agent {
            prefs.push(Pref::text("general.useragent.override", user_agent.clone()));
        }

        prefs
    }

    /// Writes preferences to `user.js`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] if the file cannot be written.
    pub fn write_prefs(&self, prefs: &[Pref]) -> Result<()> {
        let file_path = self.path.join("user.js");

        let mut content = String::from(USER_JS_HEADER);
        for pref in prefs {
            content.push_str(&pref.to_line());
            content.push('\n');
        }

        fs::write(&file_path, content).map_err(|e| {
            Error::profile(format!(
                "Failed to write user.js at {}: {e}",
                file_path.display()
            ))
        })?;

        debug!(path = %file_path.display(), pref_count = prefs.len(), "Wrote preferences");
        Ok(())
    }

    /// Installs the extension into `extensions/<gecko id>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] for a bad archive or manifest.
    pub fn install_extension(&self, source: &ExtensionSource) -> Result<()> {
        match source {
            ExtensionSource::Unpacked(path) => self.install_unpacked(path),
            ExtensionSource::Packed(path) => {
                let file = fs::File::open(path)?;
                let mut archive = ZipArchive::new(file)
                    .map_err(|e| Error::profile(format!("Invalid extension archive: {e}")))?;

                let extracted = TempDir::new()?;
                archive
                    .extract(extracted.path())
                    .map_err(|e| Error::profile(format!("Failed to extract extension: {e}")))?;

                self.install_unpacked(extracted.path())
            }
        }
    }

    /// Copies an unpacked extension directory into the profile.
    fn install_unpacked(&self, src: &Path) -> Result<()> {
        let extension_id = read_manifest_id(src)?;
        let dest = self.path.join("extensions").join(&extension_id);
        copy_dir_recursive(src, &dest)?;

        debug!(%extension_id, dest = %dest.display(), "Installed extension");
        Ok(())
    }
}

// ============================================================================
// Private Helpers
// ============================================================================

/// Reads the gecko ID from `manifest.json`.
fn read_manifest_id(dir: &Path) -> Result<String> {
    let manifest_path = dir.join("manifest.json");
    let content = fs::read_to_string(&manifest_path).map_err(|e| {
        Error::profile(format!(
            "Extension manifest not found at {}: {e}",
            manifest_path.display()
        ))
    })?;

    let json: Value =
        from_str(&content).map_err(|e| Error::profile(format!("Invalid manifest.json: {e}")))?;

    ["/browser_specific_settings/gecko/id", "/applications/gecko/id"]
        .iter()
        .find_map(|pointer| json.pointer(pointer).and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| Error::profile("Extension manifest missing 'gecko.id' field"))
}

/// Recursively copies a directory and all its contents.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_extension(dir: &Path) {
        fs::create_dir_all(dir.join("content")).expect("mkdir");
        fs::write(
            dir.join("manifest.json"),
            r#"{"browser_specific_settings":{"gecko":{"id":"driver@whatslogged"}}}"#,
        )
        .expect("manifest");
        fs::write(dir.join("content/bridge.js"), "// bridge").expect("script");
    }

    #[test]
    fn test_temp_profile_cleanup_on_drop() {
        let path = {
            let profile = Profile::new_temp().expect("create temp profile");
            let path = profile.path().to_path_buf();
            assert!(path.is_dir());
            path
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_user_agent_pref_written_when_set() {
        let options = BrowserOptions::new().with_user_agent("Agent \"X\"");
        let prefs = Profile::prefs_for(&options);
        let ua = prefs
            .iter()
            .find(|p| p.key == "general.useragent.override")
            .expect("ua pref");
        assert_eq!(
            ua.to_line(),
            r#"user_pref("general.useragent.override", "Agent \"X\"");"#
        );

        let plain = Profile::prefs_for(&BrowserOptions::new());
        assert!(plain.iter().all(|p| p.key != "general.useragent.override"));
    }

    #[test]
    fn test_prepare_installs_unpacked_extension() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_extension(temp.path());

        let source = ExtensionSource::from(temp.path().to_path_buf());
        assert!(matches!(source, ExtensionSource::Unpacked(_)));

        let profile = Profile::prepare(&source, &BrowserOptions::new()).expect("prepare");
        let installed = profile.path().join("extensions/driver@whatslogged");
        assert!(installed.join("manifest.json").is_file());
        assert!(installed.join("content/bridge.js").is_file());

        let user_js = fs::read_to_string(profile.path().join("user.js")).expect("user.js");
        assert!(user_js.contains(r#"user_pref("xpinstall.signatures.required", false);"#));
    }

    #[test]
    fn test_manifest_without_id_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("manifest.json"), r#"{"name":"x"}"#).expect("manifest");

        let profile = Profile::new_temp().expect("profile");
        let err = profile
            .install_extension(&ExtensionSource::Unpacked(temp.path().to_path_buf()))
            .expect_err("missing id");
        assert!(matches!(err, Error::Profile { .. }));
    }
}
