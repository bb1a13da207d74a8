//! `wg` and `wg-quick` front-end
//!
//! Key generation, live-apply, interface up/down and status queries all
//! delegate to the WireGuard command-line tools through a
//! [`CommandExecutor`]. Failures are reported as-is; nothing is retried
//! and nothing written to a config file is rolled back.

use crate::config::validation::validate_interface_name;
use crate::error::{Result, WgUtilsError};
use crate::platform::detection::{detect_environment, install_with, MANUAL_INSTALL_HINT};
use crate::platform::{CommandExecutor, CommandSpec};
use crate::wireguard::keys::{KeyPair, PresharedKey, PrivateKey};
use crate::wireguard::peer::PeerManager;
use crate::wireguard::status::{parse_show_output, PeerStatus};
use crate::wireguard::store::PeerStore;
use tracing::{debug, info};

/// Default name of the `wg` binary
pub const DEFAULT_WG_BINARY: &str = "wg";

/// Default name of the `wg-quick` binary
pub const DEFAULT_WG_QUICK_BINARY: &str = "wg-quick";

/// WireGuard tooling over a command executor
#[derive(Debug, Clone)]
pub struct WgTools<E> {
    executor: E,
    wg: String,
    wg_quick: String,
}

impl<E: CommandExecutor> WgTools<E> {
    /// Use `wg` and `wg-quick` from `PATH`
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            wg: DEFAULT_WG_BINARY.to_string(),
            wg_quick: DEFAULT_WG_QUICK_BINARY.to_string(),
        }
    }

    /// Override the binary names or paths
    pub fn with_binaries(mut self, wg: impl Into<String>, wg_quick: impl Into<String>) -> Self {
        self.wg = wg.into();
        self.wg_quick = wg_quick.into();
        self
    }

    /// Underlying executor
    pub fn executor(&self) -> &E {
        &self.executor
    }

    async fn run_ok(&self, spec: CommandSpec) -> Result<String> {
        self.executor.run(&spec).await?.into_stdout(&spec)
    }

    fn wg(&self) -> CommandSpec {
        CommandSpec::new(&self.wg)
    }

    /// Generate a private key and derive its public key
    pub async fn generate_keys(&self) -> Result<KeyPair> {
        let private = self
            .run_ok(self.wg().arg("genkey"))
            .await
            .map_err(|e| WgUtilsError::KeyGeneration(format!("Failed to generate keys: {}", e)))?;
        let private = PrivateKey::new(&private);

        let public = self.public_key(&private).await?;
        debug!("Generated key pair with public key {}", public);
        Ok(KeyPair { private, public })
    }

    /// Generate a preshared key
    pub async fn generate_preshared_key(&self) -> Result<PresharedKey> {
        let psk = self.run_ok(self.wg().arg("genpsk")).await.map_err(|e| {
            WgUtilsError::KeyGeneration(format!("Failed to generate preshared key: {}", e))
        })?;
        Ok(PresharedKey::new(&psk))
    }

    /// Derive the public key for a private key
    pub async fn public_key(&self, private: &PrivateKey) -> Result<String> {
        let spec = self
            .wg()
            .arg("pubkey")
            .stdin(format!("{}\n", private.expose()));
        let public = self.run_ok(spec).await.map_err(|e| {
            WgUtilsError::KeyGeneration(format!("Failed to derive public key: {}", e))
        })?;

        let public = public.trim();
        if public.is_empty() {
            return Err(WgUtilsError::KeyGeneration(
                "wg pubkey printed no key".to_string(),
            ));
        }
        Ok(public.to_string())
    }

    /// Public key of the `[Interface]` private key in a stored config
    pub async fn public_key_from_config<S: PeerStore>(
        &self,
        manager: &PeerManager<S>,
    ) -> Result<String> {
        let private = PrivateKey::new(&manager.interface_private_key().await?);
        self.public_key(&private).await
    }

    /// Apply the on-disk config to the running interface without a restart
    ///
    /// Equivalent to `wg syncconf <iface> <(wg-quick strip <iface>)`.
    pub async fn sync_config(&self, iface: &str) -> Result<()> {
        validate_interface_name(iface)?;

        let stripped = self
            .run_ok(CommandSpec::new(&self.wg_quick).args(["strip", iface]))
            .await?;
        self.run_ok(
            self.wg()
                .args(["syncconf", iface, "/dev/stdin"])
                .stdin(stripped),
        )
        .await?;

        info!("Synchronized interface {} with its configuration", iface);
        Ok(())
    }

    /// Bring the interface up with `wg-quick up`
    pub async fn up(&self, iface: &str) -> Result<()> {
        validate_interface_name(iface)?;
        self.run_ok(CommandSpec::new(&self.wg_quick).args(["up", iface]))
            .await
            .map_err(|e| {
                WgUtilsError::Command(format!(
                    "Failed to bring up WireGuard interface {}: {}",
                    iface, e
                ))
            })?;
        info!("Interface {} is up", iface);
        Ok(())
    }

    /// Bring the interface down with `wg-quick down`
    pub async fn down(&self, iface: &str) -> Result<()> {
        validate_interface_name(iface)?;
        self.run_ok(CommandSpec::new(&self.wg_quick).args(["down", iface]))
            .await
            .map_err(|e| {
                WgUtilsError::Command(format!(
                    "Failed to bring down WireGuard interface {}: {}",
                    iface, e
                ))
            })?;
        info!("Interface {} is down", iface);
        Ok(())
    }

    /// Per-peer runtime status from `wg show <iface>`
    pub async fn show(&self, iface: &str) -> Result<Vec<PeerStatus>> {
        validate_interface_name(iface)?;
        let output = self
            .run_ok(self.wg().args(["show", iface]))
            .await
            .map_err(|e| {
                WgUtilsError::Command(format!(
                    "Failed to get handshake information for interface {}: {}",
                    iface, e
                ))
            })?;
        Ok(parse_show_output(&output))
    }

    /// Whether `wg --version` runs successfully
    pub async fn is_available(&self) -> bool {
        match self.executor.run(&self.wg().arg("--version")).await {
            Ok(output) => output.success(),
            Err(e) => {
                debug!("WireGuard tools not available: {}", e);
                false
            }
        }
    }

    /// Fail with install hints when the tools are missing
    pub async fn require_available(&self) -> Result<()> {
        if self.is_available().await {
            return Ok(());
        }
        Err(WgUtilsError::NotFound(format!(
            "WireGuard is not installed or not available in PATH. {}",
            MANUAL_INSTALL_HINT
        )))
    }

    /// Install WireGuard tools through the detected package manager
    ///
    /// Returns `false` when the tools were already present and `force` is
    /// not set.
    pub async fn install_wireguard(&self, force: bool) -> Result<bool> {
        if !force && self.is_available().await {
            info!("WireGuard is already installed");
            return Ok(false);
        }

        let platform = detect_environment(&self.executor).await;
        install_with(&self.executor, &platform).await?;

        if !self.is_available().await {
            return Err(WgUtilsError::Platform(
                "WireGuard installation completed but wg command is still not available"
                    .to_string(),
            ));
        }

        info!("WireGuard installed successfully on {}", platform.description());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::command::MockCommandExecutor;
    use crate::platform::CommandOutput;
    use mockall::Sequence;

    const PRIVATE: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";
    const PUBLIC: &str = "HIgo9xNzJMWLKASShiTqIybxZ0U3wGLiUeJ1PKf8ykw=";

    #[tokio::test]
    async fn test_generate_keys() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        executor
            .expect_run()
            .withf(|spec| spec.args == ["genkey"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok(format!("{}\n", PRIVATE))));
        executor
            .expect_run()
            .withf(|spec| spec.args == ["pubkey"] && spec.stdin.as_deref() == Some("yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=\n"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok(format!("{}\n", PUBLIC))));

        let pair = WgTools::new(executor).generate_keys().await.unwrap();
        assert_eq!(pair.private.expose(), PRIVATE);
        assert_eq!(pair.public, PUBLIC);
    }

    #[tokio::test]
    async fn test_key_generation_failure() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .returning(|_| Ok(CommandOutput::failed(1, "wg: command not found")));

        let err = WgTools::new(executor).generate_keys().await.unwrap_err();
        assert!(matches!(err, WgUtilsError::KeyGeneration(ref m) if m.contains("command not found")));
    }

    #[tokio::test]
    async fn test_generate_preshared_key() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .withf(|spec| spec.program == "/usr/bin/wg" && spec.args == ["genpsk"])
            .returning(|_| Ok(CommandOutput::ok("psk-value\n")));

        let tools = WgTools::new(executor).with_binaries("/usr/bin/wg", "/usr/bin/wg-quick");
        let psk = tools.generate_preshared_key().await.unwrap();
        assert_eq!(psk.expose(), "psk-value");
    }

    #[tokio::test]
    async fn test_sync_config_pipes_stripped_config() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        executor
            .expect_run()
            .withf(|spec| spec.program == "wg-quick" && spec.args == ["strip", "wg0"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok("[Interface]\nListenPort = 51820\n")));
        executor
            .expect_run()
            .withf(|spec| {
                spec.program == "wg"
                    && spec.args == ["syncconf", "wg0", "/dev/stdin"]
                    && spec.stdin.as_deref() == Some("[Interface]\nListenPort = 51820\n")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok("")));

        WgTools::new(executor).sync_config("wg0").await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_interface_never_reaches_executor() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_run().never();

        let tools = WgTools::new(executor);
        assert!(matches!(
            tools.up("wg0; reboot").await,
            Err(WgUtilsError::Validation(_))
        ));
        assert!(tools.sync_config("").await.is_err());
    }

    #[tokio::test]
    async fn test_up_failure_reports_stderr() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .returning(|_| Ok(CommandOutput::failed(1, "wg-quick: `wg0' already exists")));

        let err = WgTools::new(executor).up("wg0").await.unwrap_err();
        assert!(err.to_string().contains("Failed to bring up WireGuard interface wg0"));
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_show() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .withf(|spec| spec.args == ["show", "wg0"])
            .returning(|_| {
                Ok(CommandOutput::ok(
                    "interface: wg0\n  listening port: 51820\n\npeer: abc=\n  allowed ips: 10.0.0.2/32\n",
                ))
            });

        let peers = WgTools::new(executor).show("wg0").await.unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].public_key, "abc=");
    }

    #[tokio::test]
    async fn test_availability() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .returning(|_| Err(WgUtilsError::Command("No such file or directory".to_string())));

        let tools = WgTools::new(executor);
        assert!(!tools.is_available().await);
        let err = tools.require_available().await.unwrap_err();
        assert!(err.to_string().contains("brew install wireguard-tools"));
    }

    #[tokio::test]
    async fn test_install_skipped_when_available() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .withf(|spec| spec.args == ["--version"])
            .times(1)
            .returning(|_| Ok(CommandOutput::ok("wireguard-tools v1.0.20210914\n")));

        assert!(!WgTools::new(executor).install_wireguard(false).await.unwrap());
    }

    #[tokio::test]
    async fn test_install_fails_when_still_missing() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_run().returning(|spec| {
            if matches!(spec.program.as_str(), "sh" | "cmd" | "which" | "where") {
                Ok(CommandOutput::ok(""))
            } else {
                Ok(CommandOutput::failed(127, "not found"))
            }
        });

        let result = WgTools::new(executor).install_wireguard(true).await;
        match std::env::consts::OS {
            "linux" | "macos" | "windows" => {
                assert!(matches!(result, Err(WgUtilsError::Platform(_))))
            }
            _ => assert!(matches!(result, Err(WgUtilsError::UnsupportedPlatform(_)))),
        }
    }
}
