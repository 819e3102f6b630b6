//! Plugin manager: discovers plugin executables, launches them and caches `Info`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use runbridge_core::{Capability, CapabilityDescriptor};
use runbridge_rpc::RpcCapability;

use crate::error::SupervisorError;
use crate::process::{launch, HostOptions, PluginClient};

/// A launched plugin process and the descriptors its plugins reported.
pub struct ManagedPlugin {
    client: PluginClient,
    descriptors: BTreeMap<String, CapabilityDescriptor>,
}

impl ManagedPlugin {
    pub fn client(&self) -> &PluginClient {
        &self.client
    }

    /// Cached `Info` result per dispensed name.
    pub fn descriptors(&self) -> &BTreeMap<String, CapabilityDescriptor> {
        &self.descriptors
    }
}

/// Owns every plugin process the host has started.
pub struct PluginManager {
    options: HostOptions,
    plugins: BTreeMap<String, ManagedPlugin>,
}

impl PluginManager {
    pub fn new(options: HostOptions) -> Self {
        Self {
            options,
            plugins: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// Launch one executable, query `Info` for every configured name and keep it.
    ///
    /// A plugin whose `Info` fails is shut down and not registered.
    pub async fn load(&mut self, path: &Path) -> Result<&ManagedPlugin, SupervisorError> {
        let client = launch(path, &[], &self.options).await?;
        let id = client.label().to_string();

        let mut descriptors = BTreeMap::new();
        for name in &self.options.names {
            let result = match client.dispense(name) {
                Ok(stub) => stub.info().await.map_err(|source| SupervisorError::Refused {
                    path: path.to_path_buf(),
                    source,
                }),
                Err(e) => Err(e),
            };
            match result {
                Ok(descriptor) => {
                    descriptors.insert(name.clone(), descriptor);
                }
                Err(e) => {
                    warn!(plugin = %id, name = %name, error = %e, "refusing plugin");
                    let _ = client.shutdown(self.options.shutdown_grace).await;
                    return Err(e);
                }
            }
        }

        info!(plugin = %id, count = descriptors.len(), "plugin registered");
        if let Some(old) = self.plugins.remove(&id) {
            let _ = old.client.shutdown(self.options.shutdown_grace).await;
        }
        Ok(self
            .plugins
            .entry(id)
            .or_insert(ManagedPlugin { client, descriptors }))
    }

    /// Load every executable in `dir`. Failures are returned, not fatal.
    pub async fn load_dir(
        &mut self,
        dir: &Path,
    ) -> Result<Vec<(PathBuf, SupervisorError)>, SupervisorError> {
        let mut failures = Vec::new();
        for path in discover(dir)? {
            if let Err(e) = self.load(&path).await {
                failures.push((path, e));
            }
        }
        Ok(failures)
    }

    pub fn get(&self, id: &str) -> Option<&ManagedPlugin> {
        self.plugins.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// `(plugin id, name, descriptor)` for every registered plugin.
    pub fn descriptors(&self) -> impl Iterator<Item = (&str, &str, &CapabilityDescriptor)> {
        self.plugins.iter().flat_map(|(id, plugin)| {
            plugin
                .descriptors
                .iter()
                .map(move |(name, d)| (id.as_str(), name.as_str(), d))
        })
    }

    /// Stub for `name` inside the process registered as `id`.
    pub fn capability(&self, id: &str, name: &str) -> Result<RpcCapability, SupervisorError> {
        self.plugins
            .get(id)
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?
            .client
            .dispense(name)
    }

    /// Shut every process down, each with the configured grace.
    pub async fn shutdown_all(&mut self) {
        let grace = self.options.shutdown_grace;
        for (id, plugin) in std::mem::take(&mut self.plugins) {
            if let Err(e) = plugin.client.shutdown(grace).await {
                warn!(plugin = %id, error = %e, "plugin shutdown failed");
            }
        }
    }
}

/// Executable regular files in `dir`, sorted by path.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, SupervisorError> {
    let entries = std::fs::read_dir(dir).map_err(|source| SupervisorError::Discovery {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| is_executable(path))
        .collect();
    found.sort();
    Ok(found)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "exe")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    const INFO_REPLY: &str = r#"{"id":1,"result":{"name":"Fake","type":"action","version":"0.1.0","author":"test","action":{"name":"Fake","description":"fake","plugin":"fake","icon":"","category":"Test","params":[]}}}"#;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn manager() -> PluginManager {
        PluginManager::new(HostOptions {
            shutdown_grace: Duration::from_secs(2),
            ..HostOptions::default()
        })
    }

    #[test]
    fn test_discover_skips_non_executables() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "b-plugin", "true");
        write_script(dir.path(), "a-plugin", "true");
        std::fs::write(dir.path().join("README"), "docs").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let names: Vec<_> = discover(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a-plugin", "b-plugin"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        assert!(matches!(
            discover(Path::new("/nonexistent/plugins")),
            Err(SupervisorError::Discovery { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_caches_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "fake",
            &format!("echo '1|1|stdio|-|jsonrpc'\nread line\necho '{INFO_REPLY}'\ncat > /dev/null"),
        );

        let mut manager = manager();
        let plugin = manager.load(&path).await.unwrap();
        assert_eq!(plugin.descriptors()["plugin"].name, "Fake");

        let listed: Vec<_> = manager.descriptors().map(|(id, name, _)| (id, name)).collect();
        assert_eq!(listed, vec![("fake", "plugin")]);
        assert!(manager.capability("fake", "plugin").is_ok());
        assert!(matches!(
            manager.capability("missing", "plugin"),
            Err(SupervisorError::NotFound(_))
        ));

        manager.shutdown_all().await;
        assert_eq!(manager.ids().count(), 0);
    }

    #[tokio::test]
    async fn test_failing_info_refuses_plugin() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "broken",
            r#"echo '1|1|stdio|-|jsonrpc'
read line
echo '{"id":1,"result":null,"error":{"capability":{"kind":"internal","message":"no info"}}}'
cat > /dev/null"#,
        );
        write_script(dir.path(), "silent", "exit 0");

        let mut manager = manager();
        let failures = manager.load_dir(dir.path()).await.unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures
            .iter()
            .any(|(_, e)| matches!(e, SupervisorError::Refused { .. })));
        assert_eq!(manager.ids().count(), 0);
    }
}
