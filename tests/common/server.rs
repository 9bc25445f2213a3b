//! Test server management.
//!
//! Spawns and manages dnsbl-checker instances for integration testing.

use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
use argon2::Argon2;
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "correct horse battery staple";

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a server on a free port with a fresh database.
    pub async fn spawn() -> anyhow::Result<Self> {
        let hash = hash_password(PASSWORD)?;
        Self::spawn_with_users(&[(USERNAME, hash.as_str())]).await
    }

    /// Spawn a server whose `[[auth.users]]` are `users` (name, PHC hash).
    pub async fn spawn_with_users(users: &[(&str, &str)]) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let port = free_port()?;

        let mut config = format!(
            r#"
[server]
listen = "127.0.0.1:{port}"

[database]
path = "{db}"

[dnsbl]
worker_pool_size = 4
domains = ["bl.invalid"]
probe_timeout_ms = 200
shutdown_timeout_secs = 1

[auth]
token_secret = "integration-test-secret-0123456789"
token_ttl_minutes = 5
"#,
            db = data_dir.path().join("test.db").display()
        );
        for (name, hash) in users {
            config.push_str(&format!(
                "\n[[auth.users]]\nname = \"{name}\"\npassword_hash = \"{hash}\"\n"
            ));
        }

        let config_path = data_dir.path().join("config.toml");
        std::fs::write(&config_path, config)?;

        let child = spawn_binary(&config_path)?;
        let server = Self {
            child,
            port,
            _data_dir: data_dir,
        };

        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until the server is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    /// Base URL, without a trailing slash.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_binary(config_path: &Path) -> anyhow::Result<Child> {
    let child = Command::new(env!("CARGO_BIN_EXE_dnsbl-checker"))
        .arg(config_path)
        .env_remove("APP_PORT")
        .env_remove("DB_PATH")
        .env_remove("TOKEN_SECRET")
        .env_remove("DNS_BLOCKLIST")
        .env_remove("WORKER_POOL_SIZE")
        .env("RUST_LOG", "warn")
        .stdout(Stdio::null())
        .spawn()?;
    Ok(child)
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("hash failed: {e}"))
}

fn free_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
