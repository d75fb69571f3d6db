//! Integration tests for swcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use serial_test::serial;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Isolated config file and state directory
    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        /// Origin on the discard port: connections are refused
        fn offline() -> Self {
            let sandbox = Self::new();
            sandbox.write_config(
                "[origin]\nurl = \"http://127.0.0.1:9\"\ntimeout_secs = 2\n\n[cache]\nramp_step_ms = 0\n",
            );
            sandbox
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join("config.toml")
        }

        fn state_dir(&self) -> PathBuf {
            self.dir.path().join("state")
        }

        fn stores_dir(&self) -> PathBuf {
            self.state_dir().join("stores")
        }

        fn write_config(&self, content: &str) {
            std::fs::write(self.config_path(), content).unwrap();
        }

        fn store(&self, name: &str) -> PathBuf {
            let dir = self.stores_dir().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            dir
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("swcache");
            cmd.current_dir(self.dir.path())
                .env("SWCACHE_CONFIG", self.config_path())
                .env("SWCACHE_STATE_DIR", self.state_dir())
                .env_remove("RUST_LOG")
                .arg("--no-local");
            cmd
        }

        fn status_json(&self) -> serde_json::Value {
            let output = self
                .cmd()
                .args(["status", "--format", "json"])
                .output()
                .unwrap();
            assert!(output.status.success());
            serde_json::from_slice(&output.stdout).unwrap()
        }
    }

    fn store_names(status: &serde_json::Value) -> Vec<String> {
        status["stores"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap().to_string())
            .collect()
    }

    fn exists(path: &Path) -> bool {
        path.exists()
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("swcache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Offline-cache lifecycle controller"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("swcache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("swcache"));
    }

    #[test]
    fn completions_need_no_config() {
        cargo_bin_cmd!("swcache")
            .args(["completions", "bash"])
            .env("SWCACHE_CONFIG", "/nonexistent/config.toml")
            .assert()
            .success()
            .stdout(predicate::str::contains("swcache"));
    }

    #[test]
    #[serial]
    fn config_path_follows_env() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                sandbox.config_path().display().to_string(),
            ));
    }

    #[test]
    #[serial]
    fn config_show_defaults() {
        Sandbox::new()
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("quiz-app"));
    }

    #[test]
    #[serial]
    fn config_init_then_set() {
        let sandbox = Sandbox::new();
        sandbox.cmd().args(["config", "init"]).assert().success();
        assert!(exists(&sandbox.config_path()));

        sandbox
            .cmd()
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        sandbox
            .cmd()
            .args(["config", "set", "cache.version", "1.0.2"])
            .assert()
            .success();
        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("version = \"1.0.2\""));
    }

    #[test]
    #[serial]
    fn config_set_rejects_bad_version() {
        Sandbox::new()
            .cmd()
            .args(["config", "set", "cache.version", "latest"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache version"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    #[serial]
    fn broken_config_is_reported() {
        let sandbox = Sandbox::new();
        sandbox.write_config("[cache\nversion =");
        sandbox
            .cmd()
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    #[serial]
    fn status_json_on_empty_state() {
        let status = Sandbox::new().status_json();
        assert_eq!(status["pwa_disabled"], false);
        assert!(status["registration"].is_null());
        assert!(store_names(&status).is_empty());
    }

    #[test]
    #[serial]
    fn activate_deletes_only_superseded_stores() {
        let sandbox = Sandbox::new();
        let old = sandbox.store("quiz-app-v1.0.0");
        let current = sandbox.store("quiz-app-v1.0.1");
        let admin = sandbox.store("quiz-admin-v1.0.1");

        sandbox
            .cmd()
            .arg("activate")
            .assert()
            .success()
            .stdout(predicate::str::contains("quiz-app-v1.0.0"));

        assert!(!exists(&old));
        assert!(exists(&current));
        assert!(exists(&admin));

        let status = sandbox.status_json();
        assert_eq!(store_names(&status).len(), 2);
        assert!(status["stores"]
            .as_array()
            .unwrap()
            .iter()
            .all(|s| s["current"] == true));
    }

    #[test]
    #[serial]
    fn clear_needs_confirmation() {
        let sandbox = Sandbox::new();
        let store = sandbox.store("quiz-app-v1.0.0");

        sandbox
            .cmd()
            .arg("clear")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing deleted"));
        assert!(exists(&store));

        sandbox
            .cmd()
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Deleted 1 store(s)"));
        assert!(!exists(&store));
    }

    #[test]
    #[serial]
    fn pwa_toggle_round_trip() {
        let sandbox = Sandbox::new();
        let store = sandbox.store("quiz-app-v1.0.1");

        sandbox.cmd().args(["pwa", "disable"]).assert().success();
        assert!(!exists(&store));
        assert_eq!(sandbox.status_json()["pwa_disabled"], true);
        sandbox
            .cmd()
            .args(["pwa", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("controller disabled"))
            .stdout(predicate::str::contains("inactive"));

        sandbox.cmd().args(["pwa", "enable"]).assert().success();
        assert_eq!(sandbox.status_json()["pwa_disabled"], false);
    }

    #[test]
    #[serial]
    fn audit_log_records_toggles() {
        let sandbox = Sandbox::new();
        sandbox.cmd().args(["pwa", "disable"]).assert().success();
        sandbox.cmd().args(["pwa", "enable"]).assert().success();

        let log = std::fs::read_to_string(sandbox.state_dir().join("audit.log")).unwrap();
        let events: Vec<String> = log
            .lines()
            .map(|line| {
                let entry: serde_json::Value = serde_json::from_str(line).unwrap();
                entry["event"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(events, vec!["pwa.disabled", "pwa.enabled"]);
    }

    #[test]
    #[serial]
    fn install_against_unreachable_origin_reports_failures() {
        let sandbox = Sandbox::offline();
        sandbox
            .cmd()
            .arg("install")
            .assert()
            .success()
            .stdout(predicate::str::contains("0 of 5 essential assets cached"));

        // The store was opened even though nothing could be primed
        let status = sandbox.status_json();
        assert_eq!(store_names(&status), vec!["quiz-app-v1.0.1"]);
    }

    #[test]
    #[serial]
    fn fetch_offline_without_cache_fails() {
        Sandbox::offline()
            .cmd()
            .args(["fetch", "/index.html"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no network and no cached copy"));
    }

    #[test]
    #[serial]
    fn fetch_bypassed_path_goes_to_network() {
        Sandbox::offline()
            .cmd()
            .args(["fetch", "/api/quizzes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Network request"));
    }
}
