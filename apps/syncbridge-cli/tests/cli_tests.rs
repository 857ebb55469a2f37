//! End-to-end command tests over local file connections.

use clap::Parser;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use syncbridge_cli::{run, Cli};

struct TestContext {
    dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let crm = dir.path().join("crm");
        let sheets = dir.path().join("sheets");
        fs::create_dir_all(&crm).unwrap();
        fs::create_dir_all(&sheets).unwrap();
        fs::write(
            crm.join("contacts.csv"),
            "id,email\n1,john@x.com\n2,jane@x.com\n3,bob@x.com\n",
        )
        .unwrap();
        fs::write(sheets.join("leads.csv"), "id,Email\n10,jane@x.com\n11,john@x.com\n").unwrap();

        let config = format!(
            "connections:\n  crm:\n    kind: file\n    credentials:\n      root: {}\n      format: csv\n  sheets:\n    kind: file\n    credentials:\n      root: {}\n      format: csv\n",
            crm.display(),
            sheets.display()
        );
        fs::write(dir.path().join("syncbridge.yaml"), config).unwrap();
        Self { dir }
    }

    fn config_path(&self) -> &Path {
        self.dir.path()
    }

    async fn run(&self, args: &[&str]) -> Result<(), i32> {
        let config = self.config_path().join("syncbridge.yaml");
        let mut argv = vec![
            "syncbridge".to_string(),
            "--config".to_string(),
            config.display().to_string(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        let cli = Cli::try_parse_from(argv).unwrap();
        run(cli).await.map_err(|e| e.exit_code())
    }
}

#[tokio::test]
async fn test_collections_and_describe() {
    let ctx = TestContext::new();
    assert_eq!(ctx.run(&["collections", "crm"]).await, Ok(()));
    assert_eq!(ctx.run(&["describe", "sheets", "leads"]).await, Ok(()));
    assert_eq!(ctx.run(&["test-connection", "crm", "--json"]).await, Ok(()));
}

#[tokio::test]
async fn test_reconcile_between_connections() {
    let ctx = TestContext::new();
    let result = ctx
        .run(&[
            "reconcile",
            "--source",
            "crm:contacts",
            "--destination",
            "sheets:leads",
            "--source-key",
            "email",
            "--destination-key",
            "Email",
        ])
        .await;
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_exit_codes() {
    let ctx = TestContext::new();

    // Unknown connection is a configuration error
    assert_eq!(ctx.run(&["collections", "billing"]).await, Err(2));

    // Missing collection is a data error
    assert_eq!(ctx.run(&["describe", "crm", "orders"]).await, Err(4));

    // Unknown key column is rejected as a bad mapping
    let result = ctx
        .run(&[
            "reconcile",
            "--source",
            "crm:contacts",
            "--destination",
            "sheets:leads",
            "--source-key",
            "mail",
            "--destination-key",
            "Email",
        ])
        .await;
    assert_eq!(result, Err(2));
}

#[tokio::test]
async fn test_explicit_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    let cli = Cli::try_parse_from([
        "syncbridge",
        "--config",
        missing.to_str().unwrap(),
        "collections",
        "crm",
    ])
    .unwrap();
    assert_eq!(run(cli).await.map_err(|e| e.exit_code()), Err(2));
}
