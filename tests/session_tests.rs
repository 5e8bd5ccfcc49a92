
use bulletin_monitor::error::MonitorError;
use test_harness::FakeHost;

#[tokio::test]
async fn test_execute_command_trims_output() {
    let host = FakeHost::new().with_command("echo hello", 0, "hello\n", "");
    let session = host.session();

    let result = session.execute_command("echo hello").await;

    assert!(result.success);
    assert_eq!(result.stdout, "hello");
    assert!(result.stderr.is_empty());
    assert_eq!(host.connects(), 1);
}

#[tokio::test]
async fn test_execute_command_failure_keeps_stdout() {
    let host = FakeHost::new().with_command("./job.sh", 3, "partial output\n", "");
    let session = host.session();

    let result = session.execute_command("./job.sh").await;

    assert!(!result.success);
    assert_eq!(result.stdout, "partial output");
    assert_eq!(result.stderr, "Exit code: 3");
}

#[tokio::test]
async fn test_execute_command_failure_reports_stderr() {
    let host = FakeHost::new().with_command("./job.sh", 1, "", "  disk full \n");
    let session = host.session();

    let result = session.execute_command("./job.sh").await;

    assert!(!result.success);
    assert_eq!(result.stderr, "disk full");
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let host = FakeHost::new();
    let session = host.session();

    session.connect().await.unwrap();
    session.connect().await.unwrap();

    assert!(session.is_active().await);
    assert_eq!(host.connects(), 1);
}

#[tokio::test]
async fn test_dropped_connection_reconnects_once() {
    let host = FakeHost::new().with_command("uptime", 0, "up 3 days", "");
    let session = host.session();
    session.connect().await.unwrap();

    host.drop_connection();
    assert!(!session.is_active().await);

    let result = session.execute_command("uptime").await;
    assert!(result.success);
    assert_eq!(host.connects(), 2);
}

#[tokio::test]
async fn test_unreachable_host_fails_commands() {
    let host = FakeHost::new();
    let session = host.session();
    session.connect().await.unwrap();

    host.drop_connection();
    host.set_reachable(false);

    let result = session.execute_command("uptime").await;
    assert!(!result.success);
    assert!(result.stderr.contains("connection refused"));
    assert!(host.executed().is_empty());

    let err = session.tail("/var/log/app.log", 10).await.unwrap_err();
    assert!(matches!(err, MonitorError::Connectivity(_)));
    assert!(err.is_session_failure());
}

#[tokio::test]
async fn test_reconnect_keeps_authentication_error() {
    let host = FakeHost::new().with_file("/var/log/app.log", "one
");
    let session = host.session();
    session.connect().await.unwrap();

    host.drop_connection();
    host.reject_credentials(true);

    let err = session.tail("/var/log/app.log", 10).await.unwrap_err();
    assert!(matches!(err, MonitorError::Authentication(_)));
    assert!(err.is_session_failure());

    let result = session.execute_command("uptime").await;
    assert!(!result.success);
    assert!(result.stderr.starts_with("Authentication failed"));
    assert_eq!(host.connects(), 1);
}

#[tokio::test]
async fn test_initial_connect_failure() {
    let host = FakeHost::new();
    host.set_reachable(false);
    let session = host.session();

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, MonitorError::Connectivity(_)));
    assert!(!session.is_active().await);
}

#[tokio::test]
async fn test_tail_returns_last_lines() {
    let host = FakeHost::new().with_file("/var/log/app.log", "one\ntwo\nthree\nfour\n");
    let session = host.session();

    let tail = session.tail("/var/log/app.log", 2).await.unwrap();

    assert_eq!(tail, "three\nfour\n");
    assert_eq!(host.executed(), vec!["tail -n 2 /var/log/app.log".to_string()]);
}

#[tokio::test]
async fn test_tail_quotes_path() {
    let host = FakeHost::new().with_file("/var/log/my app.log", "a\nb\n");
    let session = host.session();

    let tail = session.tail("/var/log/my app.log", 5).await.unwrap();

    assert_eq!(tail, "a\nb\n");
    assert_eq!(host.executed(), vec!["tail -n 5 '/var/log/my app.log'".to_string()]);
}

#[tokio::test]
async fn test_cat_missing_file_is_remote_error() {
    let host = FakeHost::new();
    let session = host.session();

    let err = session.cat("/var/log/missing.log").await.unwrap_err();

    match err {
        MonitorError::Remote(stderr) => assert!(stderr.contains("No such file")),
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_file_exists() {
    let host = FakeHost::new().with_file("/out/report.pdf", "pdf");
    let session = host.session();

    assert!(session.file_exists("/out/report.pdf").await);
    assert!(!session.file_exists("/out/other.pdf").await);
}

#[tokio::test]
async fn test_file_exists_false_when_unreachable() {
    let host = FakeHost::new().with_file("/out/report.pdf", "pdf");
    host.set_reachable(false);
    let session = host.session();

    assert!(!session.file_exists("/out/report.pdf").await);
}

#[tokio::test]
async fn test_download_keeps_base_name() {
    let host = FakeHost::new().with_file("/out/2024/report_20240115.pdf", "%PDF-1.4 content");
    let session = host.session();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("req-1");

    let local = session
        .download_file("/out/2024/report_20240115.pdf", &target)
        .await
        .unwrap();

    assert_eq!(local, target.join("report_20240115.pdf"));
    assert_eq!(std::fs::read(&local).unwrap(), b"%PDF-1.4 content");
}

#[tokio::test]
async fn test_failed_download_removes_partial_file() {
    let host = FakeHost::new().with_file("/out/big.bin", vec![7u8; 64]);
    host.fail_downloads(true);
    let session = host.session();
    let dir = tempfile::tempdir().unwrap();

    let result = session.download_file("/out/big.bin", dir.path()).await;

    assert!(result.is_err());
    assert!(!dir.path().join("big.bin").exists());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let host = FakeHost::new();
    let session = host.session();
    session.connect().await.unwrap();

    session.close().await;
    session.close().await;

    assert_eq!(host.closes(), 1);
    assert!(!session.is_active().await);
}

#[tokio::test]
async fn test_concurrent_commands_share_one_connection() {
    let host = FakeHost::new().with_command("date", 0, "today", "");
    let session = host.session();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            session.execute_command("date").await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    assert_eq!(host.connects(), 1);
    assert_eq!(host.executed().len(), 8);
}
