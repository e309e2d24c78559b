//! Channel implementation for the node the process runs on.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use walkdir::WalkDir;

use crate::error::ChannelError;
use crate::fs::{clear_dir, extract_archive};

use super::channel::{Artifact, Channel, INSTALL_MARKER, ProbeReport, ScriptOutput};

/// Environment variables exposed to install scripts.
pub const BASE_DIR_VARS: &[&str] = &["VAULT_BASE_DIR", "BASEDIR"];

#[derive(Debug, Clone, Default)]
pub struct LocalChannel;

impl LocalChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Channel for LocalChannel {
    fn describe(&self) -> String {
        "local".to_string()
    }

    fn probe(&self) -> Result<ProbeReport, ChannelError> {
        let mut attributes = BTreeMap::new();
        attributes.insert("os.family".to_string(), os_family().to_string());
        attributes.insert("os.name".to_string(), std::env::consts::OS.to_string());
        attributes.insert("os.arch".to_string(), std::env::consts::ARCH.to_string());
        attributes.insert("os.version".to_string(), os_version().to_lowercase());

        Ok(ProbeReport {
            system_properties: system_properties(&attributes),
            attributes,
        })
    }

    fn install_if_necessary(
        &self,
        artifact: &Artifact,
        target: &Path,
    ) -> Result<bool, ChannelError> {
        let marker = target.join(INSTALL_MARKER);
        if let Ok(installed) = fs::read_to_string(&marker)
            && installed.trim() == artifact.digest
        {
            return Ok(false);
        }

        if target.is_file() {
            fs::remove_file(target)?;
        }
        clear_dir(target)?;
        extract_archive(&artifact.path, target)?;
        fs::write(&marker, &artifact.digest)?;
        Ok(true)
    }

    fn exists(&self, path: &Path) -> Result<bool, ChannelError> {
        Ok(path.exists())
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<String>, ChannelError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(dir) {
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(rel);
            }
        }
        Ok(files)
    }

    #[cfg(unix)]
    fn set_executable(&self, path: &Path) -> Result<(), ChannelError> {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(path, perms)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn set_executable(&self, _path: &Path) -> Result<(), ChannelError> {
        Ok(())
    }

    fn run_script(&self, script: &Path, base_dir: &Path) -> Result<ScriptOutput, ChannelError> {
        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(script);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg(script);
            c
        };
        command.current_dir(base_dir);
        for var in BASE_DIR_VARS {
            command.env(var, base_dir);
        }

        let output = command.output().map_err(|e| ChannelError::Script {
            script: script.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ScriptOutput {
            status: output.status.code(),
            output: combined,
        })
    }
}

fn os_family() -> &'static str {
    if cfg!(windows) {
        "windows"
    } else if cfg!(target_os = "macos") {
        "mac"
    } else {
        "unix"
    }
}

fn os_version() -> String {
    let output = if cfg!(windows) {
        Command::new("cmd").args(["/C", "ver"]).output()
    } else {
        Command::new("uname").arg("-r").output()
    };
    match output {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if text.is_empty() {
                "unknown".to_string()
            } else {
                text
            }
        }
        _ => "unknown".to_string(),
    }
}

fn system_properties(attributes: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut props: BTreeMap<String, String> = attributes
        .iter()
        .filter(|(k, _)| k.as_str() != "os.family")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if let Some(home) = dirs::home_dir() {
        props.insert("user.home".to_string(), home.display().to_string());
    }
    if let Ok(cwd) = std::env::current_dir() {
        props.insert("user.dir".to_string(), cwd.display().to_string());
    }
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    props.insert("user.name".to_string(), user);
    props.insert(
        "tmp.dir".to_string(),
        std::env::temp_dir().display().to_string(),
    );
    props.insert(
        "file.separator".to_string(),
        std::path::MAIN_SEPARATOR.to_string(),
    );
    props.insert(
        "path.separator".to_string(),
        if cfg!(windows) { ";" } else { ":" }.to_string(),
    );
    props.insert(
        "line.separator".to_string(),
        if cfg!(windows) { "\r\n" } else { "\n" }.to_string(),
    );

    for (key, value) in std::env::vars() {
        props.insert(format!("env.{key}"), value);
    }
    props
}
