use backup_orchestrator::config::ConfigLoader;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const KEYS: &[&str] = &[
    "BACKUPS_PROFILE",
    "BACKUPS_API_BIND_ADDR",
    "BACKUPS_LOG_LEVEL",
    "BACKUPS_STORAGE_ROOT",
    "BACKUPS_COMMAND_TIMEOUT_SECONDS",
    "BACKUPS_AUTO_CLEANUP",
    "BACKUPS_DEFAULT_RETENTION_DAYS",
    "BACKUPS_PG_DUMP_PATH",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    for key in KEYS {
        unsafe {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.storage.default_retention_days, 30);
    assert_eq!(cfg.storage.command_timeout_seconds, 3600);
    assert!(cfg.storage.auto_cleanup);
    assert_eq!(cfg.tools.pg_dump, "pg_dump");
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "BACKUPS_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "BACKUPS_API_BIND_ADDR=192.168.0.10:5000\nBACKUPS_DEFAULT_RETENTION_DAYS=14\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "BACKUPS_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "BACKUPS_PROFILE=test\nBACKUPS_API_BIND_ADDR=127.0.0.1:4000\nBACKUPS_STORAGE_ROOT=/srv/backups\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.storage.root, PathBuf::from("/srv/backups"));
    assert_eq!(cfg.storage.default_retention_days, 14);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "BACKUPS_API_BIND_ADDR=127.0.0.1:3000\nBACKUPS_PG_DUMP_PATH=/opt/pg/bin/pg_dump\n",
    );

    unsafe {
        env::set_var("BACKUPS_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("BACKUPS_AUTO_CLEANUP", "false");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.tools.pg_dump, "/opt/pg/bin/pg_dump");
    assert!(!cfg.storage.auto_cleanup);

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("BACKUPS_API_BIND_ADDR", "not-an-addr");
    }
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn zero_command_timeout_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("BACKUPS_COMMAND_TIMEOUT_SECONDS", "0");
    }
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("zero timeout should fail");
    assert!(err.to_string().contains("command timeout"));

    clear_env();
}
