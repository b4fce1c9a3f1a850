//! Test server management.
//!
//! Spawns and manages emberd instances for integration testing.

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tokio::time::sleep;

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    data_dir: PathBuf,
}

impl TestServer {
    /// Spawn a new test server with default liveness timers.
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        Self::spawn_with(port, 1, 300).await
    }

    /// Spawn a new test server with explicit liveness timers.
    pub async fn spawn_with(port: u16, sweep_secs: u64, idle_secs: u64) -> anyhow::Result<Self> {
        // Create temporary directory for test data
        let data_dir = std::env::temp_dir().join(format!("emberd-test-{}", port));
        std::fs::create_dir_all(&data_dir)?;

        // Create minimal test configuration
        let config_path = data_dir.join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "test.ember"
metrics_port = 0

[listen]
address = "127.0.0.1:{}"

[timeouts]
sweep_interval_secs = {}
idle_timeout_secs = {}
"#,
            port, sweep_secs, idle_secs
        );

        std::fs::write(&config_path, config_content)?;

        // Spawn the server binary built for this test run
        let child = Command::new(env!("CARGO_BIN_EXE_emberd"))
            .arg(&config_path)
            .spawn()?;

        let server = Self {
            child,
            port,
            data_dir,
        };

        // Wait for server to start listening
        server.wait_until_ready().await?;

        Ok(server)
    }

    /// Address clients should dial.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        let address = self.address();
        for _ in 0..100 {
            if tokio::net::TcpStream::connect(&address).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server on {} did not become ready", address)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}
