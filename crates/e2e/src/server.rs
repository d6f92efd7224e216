//! Server management - starting the local web server and probing the site

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::WebServerConfig;
use crate::error::{E2eError, E2eResult};

/// Handle to the local web server
pub struct ServerHandle {
    /// `None` when an already running server was reused
    child: Option<Child>,
    pub url: String,
}

impl ServerHandle {
    /// Start the configured server, or reuse one already answering on its port
    pub async fn spawn(config: &WebServerConfig) -> E2eResult<Self> {
        let url = config.url();
        let client = http_client()?;

        if config.reuse_existing_server && is_healthy(&client, &url).await {
            info!("Reusing web server already running at {}", url);
            return Ok(ServerHandle { child: None, url });
        }

        info!("Starting web server: {} (port {})", config.command, config.port);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&config.command)
            .env("PORT", config.port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!("failed to spawn '{}': {}", config.command, e))
        })?;

        let handle = ServerHandle {
            child: Some(child),
            url,
        };

        // Wait for server to be healthy
        handle
            .wait_for_healthy(&client, Duration::from_millis(config.startup_timeout_ms))
            .await?;

        info!("Web server is up at {}", handle.url);
        Ok(handle)
    }

    /// Poll until the server answers
    async fn wait_for_healthy(&self, client: &reqwest::Client, limit: Duration) -> E2eResult<()> {
        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < limit {
            attempts += 1;

            if is_healthy(client, &self.url).await {
                return Ok(());
            }
            if attempts == 1 {
                info!("Waiting for web server to start...");
            }

            sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    pub fn spawned(&self) -> bool {
        self.child.is_some()
    }

    /// Stop the server if we started it
    pub fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!("Stopping web server (pid: {})", child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = child.kill();
        let _ = child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn http_client() -> E2eResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?)
}

/// Whether an HTTP status means "something is serving"
///
/// Auth walls (401/403) and bad-request pages still prove the server is up.
pub fn is_serving(status: reqwest::StatusCode) -> bool {
    status.is_success() || status.is_redirection() || (400..=403).contains(&status.as_u16())
}

async fn is_healthy(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(resp) => {
            debug!("Health check {} returned {}", url, resp.status());
            is_serving(resp.status())
        }
        Err(e) => {
            // Connection refused is expected while the server is starting
            if !e.is_connect() {
                warn!("Health check error: {}", e);
            }
            false
        }
    }
}

/// Fail fast when the site under test does not answer at all
pub async fn check_site_reachable(url: &str, limit: Duration) -> E2eResult<()> {
    let client = reqwest::Client::builder().timeout(limit).build()?;

    match client.get(url).send().await {
        Ok(resp) if resp.status().is_server_error() => Err(E2eError::SiteUnreachable {
            url: url.to_string(),
            reason: format!("server answered {}", resp.status()),
        }),
        Ok(resp) => {
            debug!("Site probe {} -> {}", url, resp.status());
            Ok(())
        }
        Err(e) => Err(E2eError::SiteUnreachable {
            url: url.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use test_case::test_case;

    #[test_case(StatusCode::OK, true ; "ok")]
    #[test_case(StatusCode::FOUND, true ; "redirect")]
    #[test_case(StatusCode::UNAUTHORIZED, true ; "auth wall")]
    #[test_case(StatusCode::FORBIDDEN, true ; "forbidden")]
    #[test_case(StatusCode::NOT_FOUND, false ; "not found")]
    #[test_case(StatusCode::BAD_GATEWAY, false ; "bad gateway")]
    fn test_is_serving(status: StatusCode, expected: bool) {
        assert_eq!(is_serving(status), expected);
    }

    #[tokio::test]
    async fn test_unreachable_site_is_reported() {
        // nothing listens on the discard port
        let err = check_site_reachable("http://127.0.0.1:9", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::SiteUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_failed_start_times_out() {
        let config = WebServerConfig {
            command: "exit 0".to_string(),
            port: 9,
            reuse_existing_server: false,
            startup_timeout_ms: 300,
            cwd: None,
        };
        match ServerHandle::spawn(&config).await {
            Err(E2eError::ServerHealthCheck(attempts)) => assert!(attempts >= 1),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("server should not be healthy"),
        }
    }
}
