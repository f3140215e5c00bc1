// Execution service process for one engine installation at a time

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;

use tracing::{debug, info, warn};
use verirun_config::ServiceSettings;
use verirun_runner::{ServiceManager, Version};
use verirun_service_client::ServiceClient;

#[cfg(windows)]
const SERVICE_EXE: &str = "oms.exe";
#[cfg(not(windows))]
const SERVICE_EXE: &str = "oms";

/// Starts `<root>/bin/oms` and waits for it to answer health checks.
pub struct OmsManager {
    settings: ServiceSettings,
    child: Option<(String, Child)>,
}

impl OmsManager {
    pub fn new(settings: ServiceSettings) -> Self {
        Self {
            settings,
            child: None,
        }
    }

    pub fn executable(version: &Version) -> PathBuf {
        version.root.join("bin").join(SERVICE_EXE)
    }
}

impl ServiceManager for OmsManager {
    fn start(&mut self, version: &Version) -> Option<String> {
        let exe = Self::executable(version);
        if !exe.is_file() {
            warn!(
                version = %version.label,
                path = %exe.display(),
                "execution service executable not found"
            );
            return None;
        }

        let workdir = exe.parent().map(PathBuf::from).unwrap_or_else(|| version.root.clone());
        let child = match Command::new(&exe)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    version = %version.label,
                    path = %exe.display(),
                    error = %e,
                    "could not start execution service"
                );
                return None;
            }
        };
        info!(version = %version.label, pid = child.id(), "execution service started");
        self.child = Some((version.label.clone(), child));

        let client = match ServiceClient::new(self.settings.base_url.as_str()) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "could not build service client");
                self.stop();
                return None;
            }
        };

        for attempt in 1..=self.settings.startup_attempts {
            thread::sleep(self.settings.startup_delay());
            if client.check_health() {
                info!(
                    version = %version.label,
                    url = %self.settings.base_url,
                    attempt,
                    "execution service is ready"
                );
                return Some(self.settings.base_url.clone());
            }
            if let Some((_, child)) = self.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    warn!(
                        version = %version.label,
                        %status,
                        "execution service exited during startup"
                    );
                    self.child = None;
                    return None;
                }
            }
            debug!(attempt, "execution service not ready yet");
        }

        warn!(
            version = %version.label,
            attempts = self.settings.startup_attempts,
            "execution service did not become ready"
        );
        self.stop();
        None
    }

    fn stop(&mut self) {
        if let Some((label, mut child)) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!(error = %e, "kill failed, service already gone");
            }
            let _ = child.wait();
            info!(version = %label, "execution service stopped");
        }
    }
}

impl Drop for OmsManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_executable_is_not_started() {
        let dir = TempDir::new().unwrap();
        let mut manager = OmsManager::new(ServiceSettings::default());
        let version = Version::from_root(dir.path());
        assert!(manager.start(&version).is_none());
        manager.stop();
    }

    #[test]
    fn executable_lives_in_bin() {
        let version = Version::new("v", "/opt/openmpp");
        assert!(OmsManager::executable(&version).starts_with("/opt/openmpp/bin"));
    }
}
